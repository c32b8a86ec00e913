//! Data model for tasks.
//!
//! - [`task`] - `Task` and its value types
//! - [`normalize`] - sanitizing untrusted records into `Task`
//! - [`task_id`] - id format and generation
//! - [`doc`] - the Summary doc section and its metadata

pub mod doc;
pub mod normalize;
pub mod task;
pub mod task_id;

pub use doc::{DocTouch, apply_doc_metadata, extract_doc, merge_doc};
pub use normalize::{normalize_priority, normalize_priority_str, normalize_task, parse_priority};
pub use task::{
    DEFAULT_DOC_UPDATER, DOC_VERSION, IdSource, Priority, Task, TaskComment, TaskCommit,
    TaskStatus,
};
pub use task_id::{generate_task_id, is_valid_task_id};
