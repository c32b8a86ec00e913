//! Task storage.
//!
//! - [`backend`] - the `TaskBackend` trait and capability flags
//! - [`local`] - file-tree store, also the offline cache for Redmine
//! - [`cache_index`] - mtime-validated listing index
//! - [`frontmatter`] - record text codec
//! - [`file`] - atomic writes and small filesystem helpers
//!
//! [`open_backend`] picks the concrete store from configuration.

pub mod backend;
pub mod cache_index;
pub mod file;
pub mod frontmatter;
pub mod local;

use std::path::Path;

pub use backend::{BackendCapabilities, TaskBackend};
pub use local::LocalTaskStore;

use crate::config::{BackendKind, EnvSnapshot, LoadedConfig, resolve_redmine_settings};
use crate::error::Result;
use crate::model::Task;
use crate::remote::RemoteTaskStore;
use crate::sync::{DEFAULT_MANAGED_BY, SyncOptions, SyncReport, TasksExport};

/// The configured backend.
#[derive(Debug)]
pub enum Backend {
    Local(LocalTaskStore),
    Redmine(RemoteTaskStore),
}

/// Build the backend named by configuration.
///
/// Redmine always gets a local cache rooted at `redmine.cache_dir`
/// (default: the local task dir).
///
/// # Errors
///
/// `BackendConfig` for incomplete Redmine settings, or an HTTP client
/// construction failure.
pub fn open_backend(loaded: &LoadedConfig, env: &EnvSnapshot) -> Result<Backend> {
    let config = &loaded.config;
    let managed_by = config
        .export
        .managed_by
        .clone()
        .unwrap_or_else(|| DEFAULT_MANAGED_BY.to_string());
    let local_store = |root: &Path| {
        let store = LocalTaskStore::new(root).with_managed_by(managed_by.clone());
        match &config.local.default_doc_updater {
            Some(identity) => store.with_default_doc_updater(identity.clone()),
            None => store,
        }
    };

    match config.backend {
        BackendKind::Local => {
            let store = local_store(&loaded.local_dir());
            tracing::debug!(root = %store.root().display(), "opened local backend");
            Ok(Backend::Local(store))
        }
        BackendKind::Redmine => {
            let settings = resolve_redmine_settings(&config.redmine, env)?;
            let cache = local_store(&loaded.cache_dir());
            tracing::debug!(url = %settings.url, cache = %cache.root().display(), "opened redmine backend");
            let store = RemoteTaskStore::connect(settings, Some(cache))?.with_managed_by(managed_by.clone());
            Ok(Backend::Redmine(store))
        }
    }
}

impl TaskBackend for Backend {
    fn name(&self) -> &'static str {
        match self {
            Self::Local(store) => store.name(),
            Self::Redmine(store) => store.name(),
        }
    }

    fn capabilities(&self) -> BackendCapabilities {
        match self {
            Self::Local(store) => store.capabilities(),
            Self::Redmine(store) => store.capabilities(),
        }
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        match self {
            Self::Local(store) => store.list_tasks().await,
            Self::Redmine(store) => store.list_tasks().await,
        }
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        match self {
            Self::Local(store) => store.get_task(id).await,
            Self::Redmine(store) => store.get_task(id).await,
        }
    }

    async fn write_task(&self, task: &Task) -> Result<()> {
        match self {
            Self::Local(store) => store.write_task(task).await,
            Self::Redmine(store) => store.write_task(task).await,
        }
    }

    async fn write_tasks(&self, tasks: &[Task]) -> Result<()> {
        match self {
            Self::Local(store) => store.write_tasks(tasks).await,
            Self::Redmine(store) => store.write_tasks(tasks).await,
        }
    }

    async fn export_tasks_json(&self, path: &Path) -> Result<TasksExport> {
        match self {
            Self::Local(store) => store.export_tasks_json(path).await,
            Self::Redmine(store) => store.export_tasks_json(path).await,
        }
    }

    async fn get_task_doc(&self, id: &str) -> Result<Option<String>> {
        match self {
            Self::Local(store) => store.get_task_doc(id).await,
            Self::Redmine(store) => store.get_task_doc(id).await,
        }
    }

    async fn set_task_doc(&self, id: &str, doc: &str, updated_by: Option<&str>) -> Result<Task> {
        match self {
            Self::Local(store) => store.set_task_doc(id, doc, updated_by).await,
            Self::Redmine(store) => store.set_task_doc(id, doc, updated_by).await,
        }
    }

    async fn touch_task_doc_metadata(&self, id: &str, updated_by: Option<&str>) -> Result<Task> {
        match self {
            Self::Local(store) => store.touch_task_doc_metadata(id, updated_by).await,
            Self::Redmine(store) => store.touch_task_doc_metadata(id, updated_by).await,
        }
    }

    async fn sync(&self, options: &SyncOptions) -> Result<SyncReport> {
        match self {
            Self::Local(store) => store.sync(options).await,
            Self::Redmine(store) => store.sync(options).await,
        }
    }

    async fn generate_task_id(&self, length: usize, attempts: usize) -> Result<String> {
        match self {
            Self::Local(store) => store.generate_task_id(length, attempts).await,
            Self::Redmine(store) => store.generate_task_id(length, attempts).await,
        }
    }
}
