//! Reconciliation and export.
//!
//! - [`engine`] - push / pull between Redmine and the local cache
//! - [`export`] - deterministic, checksummed JSON export
//! - [`hash`] - canonical JSON and SHA-256 helpers
//! - [`types`] - sync options, conflict policy and report

pub mod engine;
pub mod export;
pub mod hash;
pub mod types;

pub use engine::{render_conflict_diff, run_sync};
pub use export::{
    DEFAULT_MANAGED_BY, ExportMeta, TasksExport, build_tasks_export_snapshot,
    verify_export_checksum, write_export,
};
pub use hash::{canonical_json, sha256_hex};
pub use types::{ConflictPolicy, SyncDirection, SyncOptions, SyncReport};
