//! Task ↔ Redmine issue mapping.
//!
//! Scalar task fields map to issue attributes (`subject`, `description`,
//! `status_id`, `priority_id`). Everything else travels in custom fields
//! whose ids come from configuration. Composite values (`verify`, `commit`,
//! `comments`, `tags`, `depends_on`) are JSON-encoded strings; decoding is
//! lenient and falls back to the raw text instead of dropping it.

use serde_json::{Map, Value, json};

use crate::config::ResolvedRedmineSettings;
use crate::model::normalize::{
    normalize_comments, normalize_commit, normalize_depends_on, normalize_doc_version,
    optional_string, string_list,
};
use crate::model::task_id::task_id_date;
use crate::model::{
    DOC_VERSION, Task, TaskComment, TaskCommit, TaskStatus, normalize_priority_str,
};

/// Author given to comment text that was not a JSON comment list.
pub const RAW_COMMENT_AUTHOR: &str = "redmine";

/// Result of decoding a JSON-carrying custom field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedField {
    /// The text parsed as JSON.
    Typed(Value),
    /// The text did not parse; kept verbatim.
    Raw(String),
}

/// Decode a custom-field value that should hold JSON. Empty means absent.
#[must_use]
pub fn decode_json_field(value: Option<&Value>) -> Option<DecodedField> {
    match value? {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(
            serde_json::from_str(text)
                .map_or_else(|_| DecodedField::Raw(text.clone()), DecodedField::Typed),
        ),
        other => Some(DecodedField::Typed(other.clone())),
    }
}

/// Raw value of custom field `field_id` on an issue.
#[must_use]
pub fn custom_field(issue: &Value, field_id: u64) -> Option<&Value> {
    issue
        .get("custom_fields")?
        .as_array()?
        .iter()
        .find(|field| field.get("id").and_then(Value::as_u64) == Some(field_id))?
        .get("value")
}

fn custom_text(issue: &Value, field_id: Option<u64>) -> Option<String> {
    optional_string(custom_field(issue, field_id?))
}

/// The task id an issue claims, if any.
#[must_use]
pub fn issue_task_id(issue: &Value, settings: &ResolvedRedmineSettings) -> Option<String> {
    custom_text(issue, Some(settings.custom_fields.task_id))
}

/// Numeric issue id.
#[must_use]
pub fn issue_id(issue: &Value) -> Option<u64> {
    issue.get("id").and_then(Value::as_u64)
}

fn warn_raw(task_id: &str, field: &str) {
    tracing::warn!(task_id, field, "custom field is not valid JSON; keeping raw text");
}

fn decode_list(issue: &Value, field_id: Option<u64>, task_id: &str, name: &str) -> Vec<String> {
    let Some(id) = field_id else {
        return Vec::new();
    };
    match decode_json_field(custom_field(issue, id)) {
        None => Vec::new(),
        Some(DecodedField::Typed(Value::String(single))) => vec![single],
        Some(DecodedField::Typed(value)) => string_list(Some(&value)),
        Some(DecodedField::Raw(raw)) => {
            warn_raw(task_id, name);
            vec![raw]
        }
    }
}

/// Comma-separated fallback for list fields people edit by hand in Redmine.
fn decode_csv_list(issue: &Value, field_id: Option<u64>, task_id: &str, name: &str) -> Vec<String> {
    let Some(id) = field_id else {
        return Vec::new();
    };
    match decode_json_field(custom_field(issue, id)) {
        None => Vec::new(),
        Some(DecodedField::Typed(Value::String(single))) => vec![single],
        Some(DecodedField::Typed(value)) => string_list(Some(&value)),
        Some(DecodedField::Raw(raw)) => {
            warn_raw(task_id, name);
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        }
    }
}

/// Convert an issue to a task. `None` if the issue carries no task id.
#[must_use]
pub fn issue_to_task(issue: &Value, settings: &ResolvedRedmineSettings) -> Option<Task> {
    let id = issue_task_id(issue, settings)?;
    let fields = &settings.custom_fields;
    let mut task = Task::new(
        id.clone(),
        issue.get("subject").and_then(Value::as_str).unwrap_or_default(),
    );
    task.description = issue
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let status = issue.get("status");
    task.status = status
        .and_then(|s| s.get("id"))
        .and_then(Value::as_u64)
        .and_then(|sid| settings.status_for_id(sid))
        .or_else(|| {
            status
                .and_then(|s| s.get("name"))
                .and_then(Value::as_str)
                .and_then(TaskStatus::parse)
        })
        .unwrap_or_default();
    task.priority = issue
        .pointer("/priority/name")
        .and_then(Value::as_str)
        .map(normalize_priority_str)
        .unwrap_or_default();

    task.owner = custom_text(issue, fields.owner).unwrap_or_default();
    task.verify = decode_list(issue, fields.verify, &id, "verify");
    task.tags = decode_csv_list(issue, fields.tags, &id, "tags");
    task.depends_on = match fields.depends_on.and_then(|f| decode_json_field(custom_field(issue, f))) {
        Some(DecodedField::Typed(value)) => normalize_depends_on(Some(&value)),
        Some(DecodedField::Raw(_)) => decode_csv_list(issue, fields.depends_on, &id, "depends_on"),
        None => Vec::new(),
    };

    task.commit = match fields.commit.and_then(|f| decode_json_field(custom_field(issue, f))) {
        Some(DecodedField::Typed(value)) => normalize_commit(Some(&value)),
        Some(DecodedField::Raw(raw)) => {
            warn_raw(&id, "commit");
            Some(TaskCommit {
                hash: raw,
                message: String::new(),
            })
        }
        None => None,
    };

    task.comments = match fields.comments.and_then(|f| decode_json_field(custom_field(issue, f))) {
        Some(DecodedField::Typed(value)) => normalize_comments(Some(&value)),
        Some(DecodedField::Raw(raw)) => {
            warn_raw(&id, "comments");
            vec![TaskComment::new(RAW_COMMENT_AUTHOR, raw)]
        }
        None => Vec::new(),
    };

    task.doc = custom_text(issue, fields.doc);
    task.doc_version = Some(
        fields
            .doc_version
            .and_then(|f| normalize_doc_version(custom_field(issue, f)))
            .unwrap_or(DOC_VERSION),
    );
    task.doc_updated_at = custom_text(issue, fields.doc_updated_at);
    task.doc_updated_by = custom_text(issue, fields.doc_updated_by);
    Some(task)
}

/// `done_ratio` implied by a status.
#[must_use]
pub const fn done_ratio(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Done => 100,
        TaskStatus::Todo | TaskStatus::Doing | TaskStatus::Blocked => 0,
    }
}

fn json_text<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Value stored in the comments custom field.
#[must_use]
pub fn comments_field_value(comments: &[TaskComment]) -> String {
    json_text(&comments)
}

/// Build the `{"issue": {...}}` body for a create or update.
#[must_use]
pub fn task_to_issue_payload(task: &Task, settings: &ResolvedRedmineSettings) -> Value {
    let fields = &settings.custom_fields;
    let mut custom: Vec<Value> = vec![json!({"id": fields.task_id, "value": task.id})];
    let mut push = |field: Option<u64>, value: String| {
        if let Some(id) = field {
            custom.push(json!({"id": id, "value": value}));
        }
    };
    push(fields.verify, json_text(&task.verify));
    push(fields.commit, task.commit.as_ref().map_or_else(String::new, json_text));
    push(fields.comments, comments_field_value(&task.comments));
    push(fields.tags, json_text(&task.tags));
    push(fields.depends_on, json_text(&task.depends_on));
    push(fields.owner, task.owner.clone());
    push(fields.doc, task.doc.clone().unwrap_or_default());
    push(
        fields.doc_version,
        task.doc_version.unwrap_or(DOC_VERSION).to_string(),
    );
    push(fields.doc_updated_at, task.doc_updated_at.clone().unwrap_or_default());
    push(fields.doc_updated_by, task.doc_updated_by.clone().unwrap_or_default());

    let mut issue = Map::new();
    issue.insert("project_id".into(), json!(settings.project_id));
    issue.insert("subject".into(), json!(task.title));
    issue.insert("description".into(), json!(task.description));
    if let Some(status_id) = settings.status_id(task.status) {
        issue.insert("status_id".into(), json!(status_id));
    }
    if let Some(priority_id) = settings.priority_id(task.priority) {
        issue.insert("priority_id".into(), json!(priority_id));
    }
    if let Some(assignee) = settings.assignee_id {
        issue.insert("assigned_to_id".into(), json!(assignee));
    }
    if let Some(date) = task_id_date(&task.id) {
        issue.insert("start_date".into(), json!(date));
    }
    issue.insert("done_ratio".into(), json!(done_ratio(task.status)));
    issue.insert("custom_fields".into(), Value::Array(custom));
    json!({ "issue": issue })
}
