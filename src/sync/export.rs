//! Deterministic task export.
//!
//! The export document is a snapshot of every task, sorted by id, with a
//! SHA-256 checksum over the canonical JSON of `{"tasks": [...]}`. The same
//! task set always produces the same bytes, so CI can diff exports.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;
use crate::model::Task;
use crate::storage::file::atomic_write;
use crate::sync::hash::{canonical_json, sha256_hex, sort_keys};

pub const EXPORT_SCHEMA_VERSION: u32 = 1;
pub const CHECKSUM_ALGO: &str = "sha256";
pub const DEFAULT_MANAGED_BY: &str = "taskbridge";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMeta {
    pub schema_version: u32,
    pub managed_by: String,
    pub checksum_algo: String,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasksExport {
    pub tasks: Vec<Task>,
    pub meta: ExportMeta,
}

fn checksum_of(tasks: &[Task]) -> Result<String> {
    let payload = json!({ "tasks": serde_json::to_value(tasks)? });
    Ok(sha256_hex(canonical_json(&payload).as_bytes()))
}

/// Build the export snapshot. Input order does not matter.
///
/// `dirty` is local bookkeeping and never appears in an export.
///
/// # Errors
///
/// Returns an error if a task cannot be serialized.
pub fn build_tasks_export_snapshot(tasks: &[Task], managed_by: &str) -> Result<TasksExport> {
    let mut tasks: Vec<Task> = tasks.iter().map(|t| t.with_dirty(false)).collect();
    tasks.sort_by(|a, b| a.id.cmp(&b.id));
    let checksum = checksum_of(&tasks)?;
    Ok(TasksExport {
        tasks,
        meta: ExportMeta {
            schema_version: EXPORT_SCHEMA_VERSION,
            managed_by: managed_by.to_string(),
            checksum_algo: CHECKSUM_ALGO.to_string(),
            checksum,
        },
    })
}

/// Recompute the checksum of an export and compare.
///
/// # Errors
///
/// Returns an error if a task cannot be serialized.
pub fn verify_export_checksum(export: &TasksExport) -> Result<bool> {
    Ok(export.meta.checksum_algo == CHECKSUM_ALGO && checksum_of(&export.tasks)? == export.meta.checksum)
}

/// Build the snapshot and write it atomically as pretty, key-sorted JSON.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_export(path: &Path, tasks: &[Task], managed_by: &str) -> Result<TasksExport> {
    let export = build_tasks_export_snapshot(tasks, managed_by)?;
    let value = sort_keys(&serde_json::to_value(&export)?);
    let mut content = serde_json::to_string_pretty(&value)?;
    content.push('\n');
    atomic_write(path, &content)?;
    tracing::info!(path = %path.display(), tasks = export.tasks.len(), "wrote task export");
    Ok(export)
}
