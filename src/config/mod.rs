//! Configuration management.
//!
//! Settings come from `.taskbridge/config.json`, discovered by walking up
//! from the working directory, with `~/.taskbridge/config.json` as the
//! fallback. A missing file means defaults (the local backend).
//!
//! Environment overrides for the Redmine backend are captured once by the
//! binary into an [`EnvSnapshot`] and merged by
//! [`resolve_redmine_settings`]. Nothing below reads the process
//! environment directly.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Priority, TaskStatus, parse_priority};
use crate::storage::file::read_optional;

pub const CONFIG_DIR: &str = ".taskbridge";
pub const CONFIG_FILE: &str = "config.json";

pub const ENV_REDMINE_URL: &str = "TASKBRIDGE_REDMINE_URL";
pub const ENV_REDMINE_API_KEY: &str = "TASKBRIDGE_REDMINE_API_KEY";
pub const ENV_REDMINE_PROJECT_ID: &str = "TASKBRIDGE_REDMINE_PROJECT_ID";
pub const ENV_REDMINE_ASSIGNEE_ID: &str = "TASKBRIDGE_REDMINE_ASSIGNEE_ID";
pub const ENV_REDMINE_OWNER_AGENT: &str = "TASKBRIDGE_REDMINE_OWNER_AGENT";

// ── File shape ────────────────────────────────────────────────

/// Which store backs the task set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Redmine,
}

/// A JSON id that may be written as a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Number(u64),
    Text(String),
}

impl IdValue {
    fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Task root, relative to the project root unless absolute.
    pub dir: PathBuf,
    pub default_doc_updater: Option<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(CONFIG_DIR).join("tasks"),
            default_doc_updater: None,
        }
    }
}

/// Redmine custom-field ids. Only `task_id` is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomFieldIds {
    pub task_id: Option<u64>,
    pub verify: Option<u64>,
    pub commit: Option<u64>,
    pub comments: Option<u64>,
    pub doc: Option<u64>,
    pub doc_version: Option<u64>,
    pub doc_updated_at: Option<u64>,
    pub doc_updated_by: Option<u64>,
    pub tags: Option<u64>,
    pub depends_on: Option<u64>,
    pub owner: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedmineConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub project_id: Option<IdValue>,
    pub assignee_id: Option<IdValue>,
    pub owner_agent: Option<String>,
    /// Task status name (`TODO`, `DOING`, ...) → Redmine status id.
    pub status_map: BTreeMap<String, u64>,
    /// Task priority name (`low`, `normal`, `med`, `high`, or a synonym such
    /// as `urgent`) → Redmine priority id.
    ///
    /// Without an entry for a priority, writes omit `priority_id` and Redmine
    /// applies its default, so that priority does not survive a round trip.
    /// Map all four to keep priorities stable.
    pub priority_map: BTreeMap<String, u64>,
    pub custom_fields: CustomFieldIds,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub attempts: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
    /// Offline cache root; defaults to the local task dir.
    pub cache_dir: Option<PathBuf>,
}

impl Default for RedmineConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            project_id: None,
            assignee_id: None,
            owner_agent: None,
            status_map: BTreeMap::new(),
            priority_map: BTreeMap::new(),
            custom_fields: CustomFieldIds::default(),
            batch_size: 10,
            batch_pause_ms: 500,
            attempts: 3,
            backoff_ms: 500,
            timeout_secs: 30,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub managed_by: Option<String>,
}

/// Parsed `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskbridgeConfig {
    pub backend: BackendKind,
    pub local: LocalConfig,
    pub redmine: RedmineConfig,
    pub export: ExportConfig,
}

/// A loaded config plus the directory relative paths resolve against.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TaskbridgeConfig,
    pub project_root: PathBuf,
    /// The file it came from, if any.
    pub source: Option<PathBuf>,
}

impl LoadedConfig {
    /// Resolve a configured path against the project root.
    #[must_use]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    #[must_use]
    pub fn local_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.local.dir)
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        match &self.config.redmine.cache_dir {
            Some(dir) => self.resolve_path(dir),
            None => self.local_dir(),
        }
    }
}

// ── Discovery ─────────────────────────────────────────────────

/// Walk up from `start` looking for `.taskbridge/config.json`.
#[must_use]
pub fn discover_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

/// `~/.taskbridge/config.json`.
#[must_use]
pub fn global_config_file() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Parse one config file.
///
/// # Errors
///
/// `Config` if the file is not valid config JSON.
pub fn load_config_file(path: &Path) -> Result<TaskbridgeConfig> {
    let Some(text) = read_optional(path)? else {
        return Ok(TaskbridgeConfig::default());
    };
    serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

/// Load configuration.
///
/// Priority:
/// 1. `explicit` path (from `--config`)
/// 2. `.taskbridge/config.json` in `cwd` or an ancestor
/// 3. `~/.taskbridge/config.json`
/// 4. Defaults, rooted at `cwd`
///
/// # Errors
///
/// `Config` for an unreadable or malformed file.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<LoadedConfig> {
    let source = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config_file(cwd).or_else(|| global_config_file().filter(|p| p.is_file())),
    };

    let Some(path) = source else {
        tracing::debug!(cwd = %cwd.display(), "no config file found; using defaults");
        return Ok(LoadedConfig {
            config: TaskbridgeConfig::default(),
            project_root: cwd.to_path_buf(),
            source: None,
        });
    };

    let config = load_config_file(&path)?;
    // <root>/.taskbridge/config.json → <root>
    let project_root = path
        .parent()
        .filter(|dir| dir.file_name().is_some_and(|n| n == CONFIG_DIR))
        .and_then(Path::parent)
        .or_else(|| path.parent())
        .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);

    tracing::debug!(path = %path.display(), backend = ?config.backend, "loaded config");
    Ok(LoadedConfig {
        config,
        project_root,
        source: Some(path),
    })
}

// ── Environment ───────────────────────────────────────────────

/// Environment overrides, captured explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    pub redmine_url: Option<String>,
    pub redmine_api_key: Option<String>,
    pub redmine_project_id: Option<String>,
    pub redmine_assignee_id: Option<String>,
    pub redmine_owner_agent: Option<String>,
}

impl EnvSnapshot {
    /// Capture from the process environment. Call once, at startup.
    #[must_use]
    pub fn capture() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            redmine_url: lookup(ENV_REDMINE_URL),
            redmine_api_key: lookup(ENV_REDMINE_API_KEY),
            redmine_project_id: lookup(ENV_REDMINE_PROJECT_ID),
            redmine_assignee_id: lookup(ENV_REDMINE_ASSIGNEE_ID),
            redmine_owner_agent: lookup(ENV_REDMINE_OWNER_AGENT),
        }
    }
}

// ── Resolution ────────────────────────────────────────────────

/// Custom-field ids after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCustomFields {
    pub task_id: u64,
    pub verify: Option<u64>,
    pub commit: Option<u64>,
    pub comments: Option<u64>,
    pub doc: Option<u64>,
    pub doc_version: Option<u64>,
    pub doc_updated_at: Option<u64>,
    pub doc_updated_by: Option<u64>,
    pub tags: Option<u64>,
    pub depends_on: Option<u64>,
    pub owner: Option<u64>,
}

/// Merged, validated Redmine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRedmineSettings {
    pub url: String,
    pub api_key: String,
    pub project_id: String,
    pub assignee_id: Option<u64>,
    pub owner_agent: Option<String>,
    pub status_map: HashMap<TaskStatus, u64>,
    pub priority_map: HashMap<Priority, u64>,
    pub custom_fields: ResolvedCustomFields,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub attempts: u32,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl ResolvedRedmineSettings {
    /// Minimal settings for a base URL, key, project and task-id field.
    #[must_use]
    pub fn new(url: &str, api_key: &str, project_id: &str, task_id_field: u64) -> Self {
        let defaults = RedmineConfig::default();
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            project_id: project_id.to_string(),
            assignee_id: None,
            owner_agent: None,
            status_map: HashMap::new(),
            priority_map: HashMap::new(),
            custom_fields: ResolvedCustomFields {
                task_id: task_id_field,
                verify: None,
                commit: None,
                comments: None,
                doc: None,
                doc_version: None,
                doc_updated_at: None,
                doc_updated_by: None,
                tags: None,
                depends_on: None,
                owner: None,
            },
            batch_size: defaults.batch_size,
            batch_pause: Duration::from_millis(defaults.batch_pause_ms),
            attempts: defaults.attempts,
            backoff: Duration::from_millis(defaults.backoff_ms),
            timeout: Duration::from_secs(defaults.timeout_secs),
        }
    }

    /// Redmine status id for a task status, if mapped.
    #[must_use]
    pub fn status_id(&self, status: TaskStatus) -> Option<u64> {
        self.status_map.get(&status).copied()
    }

    /// Task status for a Redmine status id, if mapped.
    #[must_use]
    pub fn status_for_id(&self, id: u64) -> Option<TaskStatus> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| self.status_map.get(status) == Some(&id))
    }

    #[must_use]
    pub fn priority_id(&self, priority: Priority) -> Option<u64> {
        self.priority_map.get(&priority).copied()
    }
}

/// Env value wins over configured; blank counts as unset.
fn pick(env: Option<&String>, configured: Option<String>) -> Option<String> {
    env.map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| configured.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}

fn required(value: Option<String>, what: &str, env_key: &str) -> Result<String> {
    value.ok_or_else(|| Error::BackendConfig(format!("missing redmine {what} (set {env_key})")))
}

/// Merge configured settings with environment overrides and validate.
///
/// # Errors
///
/// `BackendConfig` when the URL, API key, project id or task-id custom field
/// is missing, or when the assignee id or a status name is malformed.
pub fn resolve_redmine_settings(
    configured: &RedmineConfig,
    env: &EnvSnapshot,
) -> Result<ResolvedRedmineSettings> {
    let url = required(
        pick(env.redmine_url.as_ref(), configured.url.clone()),
        "url",
        ENV_REDMINE_URL,
    )?;
    let api_key = required(
        pick(env.redmine_api_key.as_ref(), configured.api_key.clone()),
        "api key",
        ENV_REDMINE_API_KEY,
    )?;
    let project_id = required(
        pick(
            env.redmine_project_id.as_ref(),
            configured.project_id.as_ref().map(IdValue::as_text),
        ),
        "project id",
        ENV_REDMINE_PROJECT_ID,
    )?;
    let task_id_field = configured.custom_fields.task_id.ok_or_else(|| {
        Error::BackendConfig("missing redmine custom_fields.task_id".to_string())
    })?;

    let assignee_id = pick(
        env.redmine_assignee_id.as_ref(),
        configured.assignee_id.as_ref().map(IdValue::as_text),
    )
    .map(|raw| {
        raw.parse::<u64>().map_err(|_| {
            Error::BackendConfig(format!("redmine assignee id must be numeric, got '{raw}'"))
        })
    })
    .transpose()?;

    let owner_agent = pick(env.redmine_owner_agent.as_ref(), configured.owner_agent.clone());

    let mut status_map = HashMap::new();
    for (name, id) in &configured.status_map {
        let status = TaskStatus::parse(name).ok_or_else(|| {
            Error::BackendConfig(format!("unknown status '{name}' in redmine.status_map"))
        })?;
        status_map.insert(status, *id);
    }
    let mut priority_map = HashMap::new();
    for (name, id) in &configured.priority_map {
        let priority = parse_priority(name).ok_or_else(|| {
            Error::BackendConfig(format!("unknown priority '{name}' in redmine.priority_map"))
        })?;
        priority_map.insert(priority, *id);
    }
    if priority_map.is_empty() {
        tracing::warn!(
            "redmine.priority_map is empty; task priorities are not sent to Redmine \
             and pulled tasks take Redmine's default priority"
        );
    }

    let fields = &configured.custom_fields;
    let mut settings = ResolvedRedmineSettings::new(&url, &api_key, &project_id, task_id_field);
    settings.assignee_id = assignee_id;
    settings.owner_agent = owner_agent;
    settings.status_map = status_map;
    settings.priority_map = priority_map;
    settings.custom_fields = ResolvedCustomFields {
        task_id: task_id_field,
        verify: fields.verify,
        commit: fields.commit,
        comments: fields.comments,
        doc: fields.doc,
        doc_version: fields.doc_version,
        doc_updated_at: fields.doc_updated_at,
        doc_updated_by: fields.doc_updated_by,
        tags: fields.tags,
        depends_on: fields.depends_on,
        owner: fields.owner,
    };
    settings.batch_size = configured.batch_size;
    settings.batch_pause = Duration::from_millis(configured.batch_pause_ms);
    settings.attempts = configured.attempts.max(1);
    settings.backoff = Duration::from_millis(configured.backoff_ms);
    settings.timeout = Duration::from_secs(configured.timeout_secs.max(1));
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn configured() -> RedmineConfig {
        RedmineConfig {
            url: Some("https://redmine.example/".into()),
            api_key: Some("secret".into()),
            project_id: Some(IdValue::Text("agents".into())),
            custom_fields: CustomFieldIds {
                task_id: Some(7),
                ..CustomFieldIds::default()
            },
            ..RedmineConfig::default()
        }
    }

    #[test]
    fn test_resolve_uses_configured_values() {
        let settings = resolve_redmine_settings(&configured(), &EnvSnapshot::default()).unwrap();
        assert_eq!(settings.url, "https://redmine.example");
        assert_eq!(settings.project_id, "agents");
        assert_eq!(settings.custom_fields.task_id, 7);
        assert_eq!(settings.assignee_id, None);
    }

    #[test]
    fn test_env_overrides_configured() {
        let env = EnvSnapshot {
            redmine_url: Some("http://localhost:3000".into()),
            redmine_project_id: Some("42".into()),
            redmine_assignee_id: Some(" 5 ".into()),
            redmine_owner_agent: Some("CODER".into()),
            ..EnvSnapshot::default()
        };
        let settings = resolve_redmine_settings(&configured(), &env).unwrap();
        assert_eq!(settings.url, "http://localhost:3000");
        assert_eq!(settings.api_key, "secret");
        assert_eq!(settings.project_id, "42");
        assert_eq!(settings.assignee_id, Some(5));
        assert_eq!(settings.owner_agent.as_deref(), Some("CODER"));
    }

    #[test]
    fn test_blank_env_does_not_override() {
        let env = EnvSnapshot {
            redmine_url: Some("   ".into()),
            ..EnvSnapshot::default()
        };
        let settings = resolve_redmine_settings(&configured(), &env).unwrap();
        assert_eq!(settings.url, "https://redmine.example");
    }

    #[test]
    fn test_missing_required_values_fail() {
        let mut config = configured();
        config.api_key = None;
        let err = resolve_redmine_settings(&config, &EnvSnapshot::default()).unwrap_err();
        assert!(matches!(err, Error::BackendConfig(ref m) if m.contains("api key")));

        let mut config = configured();
        config.custom_fields.task_id = None;
        let err = resolve_redmine_settings(&config, &EnvSnapshot::default()).unwrap_err();
        assert!(matches!(err, Error::BackendConfig(ref m) if m.contains("task_id")));
    }

    #[test]
    fn test_non_numeric_assignee_fails() {
        let env = EnvSnapshot {
            redmine_assignee_id: Some("bob".into()),
            ..EnvSnapshot::default()
        };
        assert!(matches!(
            resolve_redmine_settings(&configured(), &env),
            Err(Error::BackendConfig(_))
        ));
    }

    #[test]
    fn test_status_and_priority_maps() {
        let mut config = configured();
        config.status_map.insert("doing".into(), 2);
        config.priority_map.insert("urgent".into(), 4);
        let settings = resolve_redmine_settings(&config, &EnvSnapshot::default()).unwrap();
        assert_eq!(settings.status_id(TaskStatus::Doing), Some(2));
        assert_eq!(settings.status_for_id(2), Some(TaskStatus::Doing));
        assert_eq!(settings.priority_id(Priority::High), Some(4));

        config.status_map.insert("someday".into(), 9);
        assert!(resolve_redmine_settings(&config, &EnvSnapshot::default()).is_err());
    }

    #[test]
    fn test_unknown_priority_name_is_rejected() {
        let mut config = configured();
        config.priority_map.insert("high".into(), 3);
        config.priority_map.insert("critical".into(), 5);
        let err = resolve_redmine_settings(&config, &EnvSnapshot::default()).unwrap_err();
        let Error::BackendConfig(message) = err else {
            panic!("expected a config error");
        };
        assert!(message.contains("critical"));

        config.priority_map.remove("critical");
        let settings = resolve_redmine_settings(&config, &EnvSnapshot::default()).unwrap();
        assert_eq!(settings.priority_id(Priority::High), Some(3));
        assert_eq!(settings.priority_id(Priority::Med), None);
    }

    #[test]
    fn test_env_snapshot_from_lookup() {
        let env = EnvSnapshot::from_lookup(|key| (key == ENV_REDMINE_API_KEY).then(|| "k".into()));
        assert_eq!(env.redmine_api_key.as_deref(), Some("k"));
        assert!(env.redmine_url.is_none());
    }

    #[test]
    fn test_load_config_discovers_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join(".taskbridge")).unwrap();
        std::fs::write(
            root.join(".taskbridge/config.json"),
            r#"{"backend": "redmine", "redmine": {"project_id": 12, "custom_fields": {"task_id": 3}}}"#,
        )
        .unwrap();
        let nested = root.join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let loaded = load_config(None, &nested).unwrap();
        assert_eq!(loaded.config.backend, BackendKind::Redmine);
        assert_eq!(loaded.project_root, root);
        assert_eq!(loaded.local_dir(), root.join(".taskbridge/tasks"));
        assert_eq!(loaded.cache_dir(), loaded.local_dir());
        assert_eq!(loaded.config.redmine.project_id, Some(IdValue::Number(12)));
        assert_eq!(loaded.config.redmine.batch_size, 10);
    }

    #[test]
    fn test_load_config_rejects_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(Some(&path), temp_dir.path()), Err(Error::Config(_))));
    }
}
