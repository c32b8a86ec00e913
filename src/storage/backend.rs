//! The `TaskBackend` contract shared by the local and Redmine stores.
//!
//! `list_tasks`, `get_task` and `write_task` are mandatory. Everything else
//! is an optional capability: callers check [`TaskBackend::capabilities`]
//! first, and the default bodies fail with [`Error::Unsupported`].

use std::future::Future;
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::Task;
use crate::sync::{SyncOptions, SyncReport, TasksExport};

/// Optional capabilities a backend advertises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackendCapabilities {
    pub write_tasks: bool,
    pub export_tasks_json: bool,
    pub task_docs: bool,
    pub sync: bool,
    pub generate_task_id: bool,
}

impl BackendCapabilities {
    /// Every optional capability enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            write_tasks: true,
            export_tasks_json: true,
            task_docs: true,
            sync: true,
            generate_task_id: true,
        }
    }
}

fn unsupported<T>(backend: &'static str, capability: &'static str) -> Result<T> {
    Err(Error::Unsupported {
        backend,
        capability,
    })
}

/// A store of tasks.
///
/// Implemented by `LocalTaskStore` and `RemoteTaskStore`. Futures are
/// `Send` so callers may drive them from any tokio runtime.
pub trait TaskBackend: Send + Sync {
    /// Short backend name for messages (`local`, `redmine`).
    fn name(&self) -> &'static str;

    /// Which optional methods this backend implements.
    fn capabilities(&self) -> BackendCapabilities;

    /// All tasks, sorted by id.
    fn list_tasks(&self) -> impl Future<Output = Result<Vec<Task>>> + Send;

    /// One task, or `None` if no record exists for `id`.
    fn get_task(&self, id: &str) -> impl Future<Output = Result<Option<Task>>> + Send;

    /// Create or update a task.
    fn write_task(&self, task: &Task) -> impl Future<Output = Result<()>> + Send;

    /// Write several tasks in order, stopping at the first failure.
    fn write_tasks(&self, tasks: &[Task]) -> impl Future<Output = Result<()>> + Send {
        let _ = tasks;
        let name = self.name();
        async move { unsupported(name, "write_tasks") }
    }

    /// Write the deterministic export document to `path`.
    fn export_tasks_json(&self, path: &Path) -> impl Future<Output = Result<TasksExport>> + Send {
        let _ = path;
        let name = self.name();
        async move { unsupported(name, "export_tasks_json") }
    }

    /// The Summary doc of one task.
    fn get_task_doc(&self, id: &str) -> impl Future<Output = Result<Option<String>>> + Send {
        let _ = id;
        let name = self.name();
        async move { unsupported(name, "task docs") }
    }

    /// Replace a task's Summary doc.
    fn set_task_doc(
        &self,
        id: &str,
        doc: &str,
        updated_by: Option<&str>,
    ) -> impl Future<Output = Result<Task>> + Send {
        let _ = (id, doc, updated_by);
        let name = self.name();
        async move { unsupported(name, "task docs") }
    }

    /// Refresh doc provenance without changing content.
    fn touch_task_doc_metadata(
        &self,
        id: &str,
        updated_by: Option<&str>,
    ) -> impl Future<Output = Result<Task>> + Send {
        let _ = (id, updated_by);
        let name = self.name();
        async move { unsupported(name, "task docs") }
    }

    /// Reconcile with a remote system of record.
    fn sync(&self, options: &SyncOptions) -> impl Future<Output = Result<SyncReport>> + Send {
        let _ = options;
        let name = self.name();
        async move { unsupported(name, "sync") }
    }

    /// Mint a task id that is free in this store.
    fn generate_task_id(
        &self,
        length: usize,
        attempts: usize,
    ) -> impl Future<Output = Result<String>> + Send {
        let _ = (length, attempts);
        let name = self.name();
        async move { unsupported(name, "generate_task_id") }
    }
}
