//! Error types for taskbridge.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=backend, 3=not_found, 4=validation, etc.)
//! - A distinguished "backend unreachable" kind that gates cache fallback
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for taskbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Network Error Kind ────────────────────────────────────────

/// Transport-level failure classes for a request that never got a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    Request,
}

impl NetworkErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
        }
    }
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Agents match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Backend (exit 2)
    BackendError,
    BackendUnavailable,

    // Not Found (exit 3)
    TaskNotFound,

    // Validation (exit 4)
    MissingTaskId,
    InvalidTaskId,
    DuplicateTaskId,
    InvalidLength,
    InvalidArgument,

    // Id generation (exit 5)
    TaskIdExhausted,

    // Sync (exit 6)
    SyncConflict,

    // Config (exit 7)
    ConfigError,
    Unsupported,

    // I/O (exit 8)
    IoError,
    JsonError,
    YamlError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::BackendError => "BACKEND_ERROR",
            Self::BackendUnavailable => "BACKEND_UNAVAILABLE",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::MissingTaskId => "MISSING_TASK_ID",
            Self::InvalidTaskId => "INVALID_TASK_ID",
            Self::DuplicateTaskId => "DUPLICATE_TASK_ID",
            Self::InvalidLength => "INVALID_LENGTH",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::TaskIdExhausted => "TASK_ID_EXHAUSTED",
            Self::SyncConflict => "SYNC_CONFLICT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::Unsupported => "UNSUPPORTED",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::YamlError => "YAML_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::BackendError | Self::BackendUnavailable => 2,
            Self::TaskNotFound => 3,
            Self::MissingTaskId
            | Self::InvalidTaskId
            | Self::DuplicateTaskId
            | Self::InvalidLength
            | Self::InvalidArgument => 4,
            Self::TaskIdExhausted => 5,
            Self::SyncConflict => 6,
            Self::ConfigError | Self::Unsupported => 7,
            Self::IoError | Self::JsonError | Self::YamlError => 8,
        }
    }

    /// Whether an agent should retry (with corrected input or later).
    ///
    /// True for validation errors and an unreachable backend. False for
    /// rejections, conflicts, or I/O errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MissingTaskId
                | Self::InvalidTaskId
                | Self::InvalidLength
                | Self::InvalidArgument
                | Self::BackendUnavailable
                | Self::TaskIdExhausted
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in task store operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Task id is required")]
    MissingTaskId,

    #[error("Invalid task id: {id}")]
    InvalidTaskId { id: String },

    #[error("Duplicate task id {id} in {first} and {second}")]
    DuplicateTaskId {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Task id suffix length must be at least 4, got {length}")]
    InvalidLength { length: usize },

    #[error("Could not generate a unique task id after {attempts} attempts")]
    TaskIdExhausted { attempts: usize },

    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("Backend configuration error: {0}")]
    BackendConfig(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("{} dirty task(s) pending push: {}; re-run with --yes to push", ids.len(), ids.join(", "))]
    PushNotConfirmed { ids: Vec<String> },

    #[error("Redmine unavailable ({kind}): {message}")]
    RedmineUnavailable {
        kind: NetworkErrorKind,
        message: String,
    },

    #[error("Sync conflict on {} task(s): {}", ids.len(), ids.join(", "))]
    SyncConflict {
        ids: Vec<String>,
        /// Rendered unified diff when the `diff` policy produced one.
        diff: Option<String>,
    },

    #[error("Backend '{backend}' does not support {capability}")]
    Unsupported {
        backend: &'static str,
        capability: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True only when the backend could not be reached at all.
    ///
    /// This is the sole condition under which reads fall back to the cache
    /// and mutations are recorded locally as dirty.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::RedmineUnavailable { .. })
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingTaskId => ErrorCode::MissingTaskId,
            Self::InvalidTaskId { .. } => ErrorCode::InvalidTaskId,
            Self::DuplicateTaskId { .. } => ErrorCode::DuplicateTaskId,
            Self::InvalidLength { .. } => ErrorCode::InvalidLength,
            Self::TaskIdExhausted { .. } => ErrorCode::TaskIdExhausted,
            Self::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            Self::BackendConfig(_) | Self::Config(_) => ErrorCode::ConfigError,
            Self::Backend(_) | Self::PushNotConfirmed { .. } => ErrorCode::BackendError,
            Self::RedmineUnavailable { .. } => ErrorCode::BackendUnavailable,
            Self::SyncConflict { .. } => ErrorCode::SyncConflict,
            Self::Unsupported { .. } => ErrorCode::Unsupported,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Yaml(_) => ErrorCode::YamlError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for agents and humans.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::InvalidTaskId { .. } => Some(
                "Task ids look like YYYYMMDDHHMM-XXXX (UTC minute, dash, 4+ chars from \
                 23456789ABCDEFGHJKLMNPQRSTUVWXYZ)"
                    .to_string(),
            ),
            Self::DuplicateTaskId { id, .. } => Some(format!(
                "Two records claim '{id}'. Remove or rename one of the directories."
            )),
            Self::TaskNotFound { id } => Some(format!(
                "No task with ID '{id}'. Use `tb list` to see available tasks."
            )),
            Self::TaskIdExhausted { .. } => {
                Some("Retry in a minute or request a longer suffix with --length.".to_string())
            }
            Self::BackendConfig(_) => Some(
                "Set redmine.url, redmine.api_key, redmine.project_id and \
                 redmine.custom_fields.task_id in .taskbridge/config.json \
                 or via TASKBRIDGE_REDMINE_* environment variables."
                    .to_string(),
            ),
            Self::RedmineUnavailable { .. } => Some(
                "Changes were kept in the local cache where possible. \
                 Run `tb sync push --yes` once Redmine is reachable."
                    .to_string(),
            ),
            Self::PushNotConfirmed { .. } => Some(
                "Review the pending tasks, then run `tb sync push --yes`.".to_string(),
            ),
            Self::SyncConflict { .. } => Some(
                "Re-run with --conflict prefer-local or --conflict prefer-remote \
                 to choose a winner."
                    .to_string(),
            ),
            Self::Unsupported { .. } => {
                Some("Switch backends in .taskbridge/config.json.".to_string())
            }
            Self::MissingTaskId
            | Self::InvalidLength { .. }
            | Self::Backend(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint. Agents parse this instead of stderr text.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }
        match self {
            Self::SyncConflict { ids, diff } => {
                obj["error"]["conflicts"] = serde_json::json!(ids);
                if let Some(diff) = diff {
                    obj["error"]["diff"] = serde_json::Value::String(diff.clone());
                }
            }
            Self::PushNotConfirmed { ids } => {
                obj["error"]["pending"] = serde_json::json!(ids);
            }
            _ => {}
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_distinct_from_backend_rejection() {
        let unavailable = Error::RedmineUnavailable {
            kind: NetworkErrorKind::Connect,
            message: "connection refused".into(),
        };
        let rejected = Error::Backend("HTTP 422".into());

        assert!(unavailable.is_unavailable());
        assert!(!rejected.is_unavailable());
        assert_eq!(unavailable.error_code(), ErrorCode::BackendUnavailable);
        assert_eq!(rejected.error_code(), ErrorCode::BackendError);
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::SyncConflict {
            ids: vec!["202601010000-ABCD".into()],
            diff: None,
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "SYNC_CONFLICT");
        assert_eq!(json["error"]["exit_code"], 6);
        assert!(json["error"]["hint"].as_str().unwrap().contains("prefer-local"));
        assert_eq!(json["error"]["conflicts"][0], "202601010000-ABCD");
        assert!(json["error"].get("diff").is_none());
    }

    #[test]
    fn test_unconfirmed_push_lists_pending_ids() {
        let err = Error::PushNotConfirmed {
            ids: vec!["202601010000-ABCD".into(), "202601010000-ABCE".into()],
        };
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("--yes"));
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "BACKEND_ERROR");
        assert_eq!(json["error"]["pending"][1], "202601010000-ABCE");
        assert!(json["error"]["hint"].as_str().unwrap().contains("--yes"));
    }

    #[test]
    fn test_validation_errors_are_retryable() {
        assert!(ErrorCode::InvalidTaskId.is_retryable());
        assert!(!ErrorCode::SyncConflict.is_retryable());
        assert_eq!(ErrorCode::InvalidLength.exit_code(), 4);
    }
}
