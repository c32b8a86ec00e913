//! Derived listing index for the local store.
//!
//! Maps each record path to the mtime it had when last parsed and the
//! normalized task it produced. An entry is only reused when the record's
//! current mtime matches exactly. The index is an optimization: a missing,
//! corrupt or unwritable index never fails a listing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::Task;
use crate::storage::file::{atomic_write, read_optional};

pub const CACHE_INDEX_FILE: &str = ".tasks-index.json";

/// Schema version - bump when the entry shape changes to force a rebuild.
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheIndexEntry {
    pub source_mtime: u64,
    pub task: Task,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheIndex {
    #[serde(default)]
    schema_version: u32,
    #[serde(default)]
    entries: BTreeMap<String, CacheIndexEntry>,
}

impl CacheIndex {
    /// Load the index, treating any read or parse problem as empty.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let content = match read_optional(path) {
            Ok(Some(content)) => content,
            Ok(None) => return Self::fresh(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "task index unreadable; rebuilding");
                return Self::fresh();
            }
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(index) if index.schema_version == SCHEMA_VERSION => index,
            Ok(_) => Self::fresh(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "task index corrupt; rebuilding");
                Self::fresh()
            }
        }
    }

    #[must_use]
    pub fn fresh() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            entries: BTreeMap::new(),
        }
    }

    fn key(record_path: &Path) -> String {
        record_path.to_string_lossy().into_owned()
    }

    /// Cached task for `record_path`, only if `mtime` still matches.
    #[must_use]
    pub fn lookup(&self, record_path: &Path, mtime: u64) -> Option<&Task> {
        self.entries
            .get(&Self::key(record_path))
            .filter(|entry| entry.source_mtime == mtime)
            .map(|entry| &entry.task)
    }

    pub fn insert(&mut self, record_path: &Path, mtime: u64, task: Task) {
        self.entries.insert(
            Self::key(record_path),
            CacheIndexEntry {
                source_mtime: mtime,
                task,
            },
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist the index.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the atomic write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self)?;
        atomic_write(path, &content)
    }

    /// Persist, logging instead of failing.
    pub fn save_best_effort(&self, path: &Path) {
        if let Err(e) = self.save(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write task index");
        }
    }
}

/// Index location for a store rooted at `root`.
#[must_use]
pub fn index_path(root: &Path) -> PathBuf {
    root.join(CACHE_INDEX_FILE)
}
