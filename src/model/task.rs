//! Task record model.
//!
//! A `Task` is the canonical in-memory shape of one unit of agent work.
//! Every value that enters the crate from disk or from Redmine passes
//! through [`crate::model::normalize`] before it becomes a `Task`.

use serde::{Deserialize, Serialize};

/// Current schema value written to `doc_version` on every write.
pub const DOC_VERSION: u32 = 2;

/// Identity recorded in `doc_updated_by` when nothing better is known.
pub const DEFAULT_DOC_UPDATER: &str = "agent";

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    Doing,
    Blocked,
    Done,
}

impl TaskStatus {
    pub const ALL: [Self; 4] = [Self::Todo, Self::Doing, Self::Blocked, Self::Done];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "TODO",
            Self::Doing => "DOING",
            Self::Blocked => "BLOCKED",
            Self::Done => "DONE",
        }
    }

    /// Case-insensitive parse; `None` for anything outside the fixed set.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let upper = input.trim().to_uppercase();
        Self::ALL.into_iter().find(|s| s.as_str() == upper)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    #[default]
    Med,
    High,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Normal, Self::Med, Self::High];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::Med => "med",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a task id came from. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdSource {
    Generated,
    Custom,
}

/// Commit that closed out a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCommit {
    pub hash: String,
    pub message: String,
}

/// A comment left on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskComment {
    pub author: String,
    pub body: String,
}

impl TaskComment {
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
        }
    }
}

/// A task as held by either store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub verify: Vec<String>,
    #[serde(default)]
    pub commit: Option<TaskCommit>,
    #[serde(default)]
    pub comments: Vec<TaskComment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_updated_by: Option<String>,
    /// Local-store only: written while the remote was unreachable.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dirty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_source: Option<IdSource>,
}

impl Task {
    /// A fresh task with defaults for everything but id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Priority::Med,
            owner: String::new(),
            depends_on: Vec::new(),
            tags: Vec::new(),
            verify: Vec::new(),
            commit: None,
            comments: Vec::new(),
            doc: None,
            doc_version: None,
            doc_updated_at: None,
            doc_updated_by: None,
            dirty: false,
            id_source: None,
        }
    }

    /// Key-sorted JSON without local bookkeeping (`dirty`, `id_source`).
    ///
    /// Two tasks describe the same remote state iff their canonical values
    /// are equal.
    #[must_use]
    pub fn canonical_value(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.remove("dirty");
            map.remove("id_source");
        }
        value
    }

    /// Pretty canonical JSON, used for human-readable diffs.
    #[must_use]
    pub fn canonical_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.canonical_value()).unwrap_or_default()
    }

    /// Copy of this task with the dirty flag set as given.
    #[must_use]
    pub fn with_dirty(&self, dirty: bool) -> Self {
        Self {
            dirty,
            ..self.clone()
        }
    }
}
