//! File-tree task store.
//!
//! One directory per task id, each holding a `README.md` record:
//!
//! ```text
//! <root>/
//!   .tasks-index.json          derived listing index (safe to delete)
//!   202601311245-7KQ3/
//!     README.md                frontmatter + markdown body
//! ```
//!
//! This is the source of truth when no issue tracker is configured, and the
//! offline cache (with `dirty` bookkeeping) when Redmine is.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::doc::{DocTouch, apply_doc_metadata, extract_doc, merge_doc};
use crate::model::task_id::{ensure_valid_task_id, generate_task_id};
use crate::model::{DEFAULT_DOC_UPDATER, Task, normalize_task};
use crate::storage::backend::{BackendCapabilities, TaskBackend};
use crate::storage::cache_index::{CacheIndex, index_path};
use crate::storage::file::{atomic_write, mtime_nanos, read_optional};
use crate::storage::frontmatter::{parse_record, render_record};
use crate::sync::{SyncOptions, SyncReport, TasksExport, write_export};

pub const RECORD_FILE: &str = "README.md";

/// Local file-tree store.
#[derive(Debug, Clone)]
pub struct LocalTaskStore {
    root: PathBuf,
    default_doc_updater: String,
    managed_by: String,
}

/// A record as found on disk.
struct StoredRecord {
    frontmatter: Map<String, Value>,
    body: String,
    task: Option<Task>,
}

impl LocalTaskStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_doc_updater: DEFAULT_DOC_UPDATER.to_string(),
            managed_by: crate::sync::DEFAULT_MANAGED_BY.to_string(),
        }
    }

    #[must_use]
    pub fn with_default_doc_updater(mut self, identity: impl Into<String>) -> Self {
        self.default_doc_updater = identity.into();
        self
    }

    #[must_use]
    pub fn with_managed_by(mut self, managed_by: impl Into<String>) -> Self {
        self.managed_by = managed_by.into();
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn default_doc_updater(&self) -> &str {
        &self.default_doc_updater
    }

    #[must_use]
    pub fn task_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    #[must_use]
    pub fn record_path(&self, id: &str) -> PathBuf {
        self.task_dir(id).join(RECORD_FILE)
    }

    /// Whether an id is free (no directory claims it).
    #[must_use]
    pub fn is_id_available(&self, id: &str) -> bool {
        !self.task_dir(id).exists()
    }

    fn parse_text(text: &str, fallback_id: &str) -> Result<StoredRecord> {
        let (frontmatter, body) = parse_record(text)?;
        let task = if frontmatter.is_empty() {
            None
        } else {
            normalize_task(&frontmatter, Some(fallback_id)).map(|mut task| {
                task.doc = extract_doc(&body);
                task
            })
        };
        Ok(StoredRecord {
            frontmatter,
            body,
            task,
        })
    }

    fn read_stored(&self, id: &str) -> Result<Option<StoredRecord>> {
        let Some(text) = read_optional(&self.record_path(id))? else {
            return Ok(None);
        };
        Self::parse_text(&text, id).map(Some)
    }

    /// Read every record, reusing index entries whose mtime still matches.
    ///
    /// # Errors
    ///
    /// `DuplicateTaskId` / `InvalidTaskId` for a broken tree, or an I/O
    /// error enumerating the root. Malformed records are skipped.
    pub fn load_all(&self) -> Result<Vec<Task>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let index_file = index_path(&self.root);
        let previous = CacheIndex::load(&index_file);
        let mut next = CacheIndex::fresh();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        let mut tasks = Vec::new();
        let mut reused = 0usize;

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            if dir_name.starts_with('.') {
                continue;
            }
            let record_path = entry.path().join(RECORD_FILE);
            let mtime = match mtime_nanos(&record_path) {
                Ok(mtime) => mtime,
                Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            let task = if let Some(cached) = previous.lookup(&record_path, mtime) {
                reused += 1;
                cached.clone()
            } else {
                let text = fs::read_to_string(&record_path)?;
                match Self::parse_text(&text, &dir_name) {
                    Ok(StoredRecord {
                        task: Some(task), ..
                    }) => task,
                    Ok(_) => {
                        tracing::warn!(path = %record_path.display(), "skipping record without frontmatter");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(path = %record_path.display(), error = %e, "skipping malformed record");
                        continue;
                    }
                }
            };

            ensure_valid_task_id(&task.id)?;
            if let Some(first) = seen.insert(task.id.clone(), record_path.clone()) {
                return Err(Error::DuplicateTaskId {
                    id: task.id,
                    first,
                    second: record_path,
                });
            }
            next.insert(&record_path, mtime, task.clone());
            tasks.push(task);
        }

        tracing::debug!(total = tasks.len(), reused, "listed local tasks");
        next.save_best_effort(&index_file);
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    /// Read one task.
    ///
    /// # Errors
    ///
    /// `MissingTaskId` / `InvalidTaskId` for a malformed id; otherwise
    /// propagates I/O errors other than "not found" and unparseable records.
    pub fn load(&self, id: &str) -> Result<Option<Task>> {
        ensure_valid_task_id(id)?;
        Ok(self.read_stored(id)?.and_then(|record| record.task))
    }

    /// Tasks flagged as written while the remote was unreachable.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load_all`].
    pub fn load_dirty(&self) -> Result<Vec<Task>> {
        Ok(self.load_all()?.into_iter().filter(|t| t.dirty).collect())
    }

    /// Persist `task` with doc-metadata rules applied. Returns what was written.
    ///
    /// # Errors
    ///
    /// `MissingTaskId` / `InvalidTaskId`, or any I/O failure.
    pub fn save(&self, task: &Task, updated_by: Option<&str>, touch: DocTouch) -> Result<Task> {
        ensure_valid_task_id(&task.id)?;
        let stored = self.read_stored_lenient(&task.id)?;
        let mut next = task.clone();
        apply_doc_metadata(
            &mut next,
            stored.as_ref().and_then(|r| r.task.as_ref()),
            updated_by,
            &self.default_doc_updater,
            touch,
        );
        self.persist(&next, stored)?;
        Ok(next)
    }

    /// Persist `task` exactly as given (used to cache remote state).
    ///
    /// # Errors
    ///
    /// `MissingTaskId` / `InvalidTaskId`, or any I/O failure.
    pub fn save_snapshot(&self, task: &Task) -> Result<()> {
        ensure_valid_task_id(&task.id)?;
        let stored = self.read_stored_lenient(&task.id)?;
        self.persist(task, stored)
    }

    /// Like `read_stored`, but a corrupt record is replaced rather than fatal.
    fn read_stored_lenient(&self, id: &str) -> Result<Option<StoredRecord>> {
        match self.read_stored(id) {
            Ok(stored) => Ok(stored),
            Err(Error::Io(e)) => Err(Error::Io(e)),
            Err(e) => {
                tracing::warn!(id, error = %e, "existing record unreadable; rewriting");
                Ok(None)
            }
        }
    }

    fn persist(&self, task: &Task, stored: Option<StoredRecord>) -> Result<()> {
        let (mut frontmatter, body) = stored
            .map(|r| (r.frontmatter, r.body))
            .unwrap_or_default();

        let Value::Object(fields) = serde_json::to_value(task)? else {
            return Err(Error::Other("task did not serialize to an object".into()));
        };
        for (key, value) in fields {
            frontmatter.insert(key, value);
        }
        frontmatter.remove("doc");
        if !task.dirty {
            frontmatter.remove("dirty");
        }

        let body = match task.doc.as_deref() {
            Some(doc) => merge_doc(&body, doc),
            None => body,
        };

        let text = render_record(&frontmatter, &body)?;
        atomic_write(&self.record_path(&task.id), &text)?;
        tracing::debug!(id = %task.id, dirty = task.dirty, "wrote local task");
        Ok(())
    }

    /// Replace the Summary doc of an existing task.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` if no record exists, plus any write error.
    pub fn update_doc(&self, id: &str, doc: &str, updated_by: Option<&str>) -> Result<Task> {
        let mut task = self
            .load(id)?
            .ok_or_else(|| Error::TaskNotFound { id: id.to_string() })?;
        task.doc = Some(doc.to_string());
        self.save(&task, updated_by, DocTouch::IfChanged)
    }

    /// Bump doc provenance unconditionally.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` if no record exists, plus any write error.
    pub fn touch_doc(&self, id: &str, updated_by: Option<&str>) -> Result<Task> {
        let task = self
            .load(id)?
            .ok_or_else(|| Error::TaskNotFound { id: id.to_string() })?;
        self.save(&task, updated_by, DocTouch::Always)
    }
}

impl TaskBackend for LocalTaskStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            sync: false,
            ..BackendCapabilities::all()
        }
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.load_all()
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        self.load(id)
    }

    async fn write_task(&self, task: &Task) -> Result<()> {
        self.save(task, None, DocTouch::IfChanged).map(|_| ())
    }

    async fn write_tasks(&self, tasks: &[Task]) -> Result<()> {
        for task in tasks {
            self.save(task, None, DocTouch::IfChanged)?;
        }
        Ok(())
    }

    async fn export_tasks_json(&self, path: &Path) -> Result<TasksExport> {
        let tasks = self.load_all()?;
        write_export(path, &tasks, &self.managed_by)
    }

    async fn get_task_doc(&self, id: &str) -> Result<Option<String>> {
        Ok(self.load(id)?.and_then(|t| t.doc))
    }

    async fn set_task_doc(&self, id: &str, doc: &str, updated_by: Option<&str>) -> Result<Task> {
        self.update_doc(id, doc, updated_by)
    }

    async fn touch_task_doc_metadata(&self, id: &str, updated_by: Option<&str>) -> Result<Task> {
        self.touch_doc(id, updated_by)
    }

    async fn sync(&self, _options: &SyncOptions) -> Result<SyncReport> {
        Err(Error::Backend(
            "sync requires the redmine backend; the local store has nothing to reconcile".into(),
        ))
    }

    async fn generate_task_id(&self, length: usize, attempts: usize) -> Result<String> {
        generate_task_id(length, attempts, |candidate| {
            let free = self.is_id_available(&candidate);
            async move { Ok(free) }
        })
        .await
    }
}
