//! Sync option and report types.

use serde::Serialize;

use crate::error::{Error, Result};

/// Which way a sync pass moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Local dirty tasks → remote.
    Push,
    /// Remote → local cache.
    Pull,
}

impl SyncDirection {
    /// Parse a caller-supplied direction.
    ///
    /// # Errors
    ///
    /// Unknown directions are a usage error surfaced as `Backend`.
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_lowercase().as_str() {
            "push" => Ok(Self::Push),
            "pull" => Ok(Self::Pull),
            other => Err(Error::Backend(format!(
                "Unknown sync direction '{other}' (expected push or pull)"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

/// How `pull` resolves a dirty cached task that differs from remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Push the local copy to remote.
    PreferLocal,
    /// Overwrite the cache with the remote copy.
    PreferRemote,
    /// Print a diff and fail.
    #[default]
    Diff,
    /// Fail without printing anything.
    Fail,
}

impl ConflictPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PreferLocal => "prefer-local",
            Self::PreferRemote => "prefer-remote",
            Self::Diff => "diff",
            Self::Fail => "fail",
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "prefer-local" | "local" => Ok(Self::PreferLocal),
            "prefer-remote" | "remote" => Ok(Self::PreferRemote),
            "diff" => Ok(Self::Diff),
            "fail" => Ok(Self::Fail),
            other => Err(Error::InvalidArgument(format!(
                "Unknown conflict policy '{other}' (expected prefer-local, prefer-remote, diff or fail)"
            ))),
        }
    }
}

/// Options for one sync call.
///
/// `direction` stays a plain string until the engine validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub direction: String,
    pub conflict: ConflictPolicy,
    pub confirm: bool,
    pub quiet: bool,
}

impl SyncOptions {
    #[must_use]
    pub fn push(confirm: bool) -> Self {
        Self {
            direction: "push".into(),
            conflict: ConflictPolicy::default(),
            confirm,
            quiet: true,
        }
    }

    #[must_use]
    pub fn pull() -> Self {
        Self {
            direction: "pull".into(),
            conflict: ConflictPolicy::default(),
            confirm: false,
            quiet: true,
        }
    }

    #[must_use]
    pub fn with_conflict(mut self, conflict: ConflictPolicy) -> Self {
        self.conflict = conflict;
        self
    }
}

/// What a sync pass did.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub direction: SyncDirection,
    /// Tasks written to remote (push, or pull with prefer-local).
    pub pushed: Vec<String>,
    /// Tasks whose cached copy was replaced by remote.
    pub pulled: Vec<String>,
    /// Dirty tasks that already matched remote; flag cleared.
    pub cleared: Vec<String>,
    /// Clean tasks already identical to remote.
    pub unchanged: usize,
}

impl SyncReport {
    #[must_use]
    pub fn new(direction: SyncDirection) -> Self {
        Self {
            direction,
            pushed: Vec::new(),
            pulled: Vec::new(),
            cleared: Vec::new(),
            unchanged: 0,
        }
    }

    /// Returns true if the pass changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pushed.is_empty() && self.pulled.is_empty() && self.cleared.is_empty()
    }
}
