//! Normalization of untrusted record data into [`Task`].
//!
//! Frontmatter on disk and issue payloads from Redmine are both treated as
//! arbitrary JSON. These functions never fail: malformed fields collapse to
//! their defaults, and only a missing id makes a record unusable.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde_json::{Map, Value};

use super::task::{IdSource, Priority, Task, TaskComment, TaskCommit, TaskStatus};

/// Literal that older writers emitted for an empty `depends_on` list.
const EMPTY_DEPENDS_SENTINEL: &str = "[]";

/// Priority synonyms. Anything not listed normalizes to `med`.
pub static PRIORITY_SYNONYMS: LazyLock<HashMap<&str, Priority>> = LazyLock::new(|| {
    [
        ("low", Priority::Low),
        ("normal", Priority::Normal),
        ("med", Priority::Med),
        ("medium", Priority::Med),
        ("high", Priority::High),
        ("urgent", Priority::High),
        ("immediate", Priority::High),
    ]
    .into_iter()
    .collect()
});

/// Strict priority lookup: a known name or synonym, else `None`.
#[must_use]
pub fn parse_priority(input: &str) -> Option<Priority> {
    let lower = input.trim().to_lowercase();
    PRIORITY_SYNONYMS.get(lower.as_str()).copied()
}

/// Normalize a priority string. Total: unknown input maps to `med`.
#[must_use]
pub fn normalize_priority_str(input: &str) -> Priority {
    parse_priority(input).unwrap_or_default()
}

/// Normalize any JSON value into a priority.
///
/// Numbers (Redmine priority ids, P-levels from other tools) carry no
/// portable meaning and map to `med`, as do missing values.
#[must_use]
pub fn normalize_priority(value: Option<&Value>) -> Priority {
    match value {
        Some(Value::String(s)) => normalize_priority_str(s),
        _ => Priority::default(),
    }
}

/// Normalize a status value; unparseable input becomes `TODO`.
#[must_use]
pub fn normalize_status(value: Option<&Value>) -> TaskStatus {
    value
        .and_then(Value::as_str)
        .and_then(TaskStatus::parse)
        .unwrap_or_default()
}

/// String field, or `""` when absent or not a string.
#[must_use]
pub fn string_field(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Optional non-blank string field.
#[must_use]
pub fn optional_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Sequence of strings; non-string elements are dropped.
#[must_use]
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// `depends_on` with the `"[]"` serialization artifact removed.
#[must_use]
pub fn normalize_depends_on(value: Option<&Value>) -> Vec<String> {
    let deps = string_list(value);
    if deps.len() == 1 && deps[0] == EMPTY_DEPENDS_SENTINEL {
        return Vec::new();
    }
    deps
}

/// Commit pair, kept only if both `hash` and `message` are strings.
#[must_use]
pub fn normalize_commit(value: Option<&Value>) -> Option<TaskCommit> {
    let obj = value?.as_object()?;
    let hash = obj.get("hash")?.as_str()?;
    let message = obj.get("message")?.as_str()?;
    Some(TaskCommit {
        hash: hash.to_string(),
        message: message.to_string(),
    })
}

/// Comments with both `author` and `body` as strings; others are dropped.
#[must_use]
pub fn normalize_comments(value: Option<&Value>) -> Vec<TaskComment> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let author = obj.get("author")?.as_str()?;
            let body = obj.get("body")?.as_str()?;
            Some(TaskComment::new(author, body))
        })
        .collect()
}

/// Doc version from a number or a numeric string.
#[must_use]
pub fn normalize_doc_version(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn normalize_dirty(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn normalize_id_source(value: Option<&Value>) -> Option<IdSource> {
    match value?.as_str()? {
        "generated" => Some(IdSource::Generated),
        "custom" => Some(IdSource::Custom),
        _ => None,
    }
}

/// Build a `Task` from an arbitrary field map.
///
/// `fallback_id` is used when the map carries no usable `id` (the local
/// store passes the record's directory name). Returns `None` when neither
/// yields an id.
#[must_use]
pub fn normalize_task(fields: &Map<String, Value>, fallback_id: Option<&str>) -> Option<Task> {
    let id = optional_string(fields.get("id")).or_else(|| {
        fallback_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    })?;

    Some(Task {
        id,
        title: string_field(fields.get("title")),
        description: string_field(fields.get("description")),
        status: normalize_status(fields.get("status")),
        priority: normalize_priority(fields.get("priority")),
        owner: string_field(fields.get("owner")),
        depends_on: normalize_depends_on(fields.get("depends_on")),
        tags: string_list(fields.get("tags")),
        verify: string_list(fields.get("verify")),
        commit: normalize_commit(fields.get("commit")),
        comments: normalize_comments(fields.get("comments")),
        doc: fields
            .get("doc")
            .and_then(Value::as_str)
            .map(|d| d.trim().to_string()),
        doc_version: normalize_doc_version(fields.get("doc_version")),
        doc_updated_at: optional_string(fields.get("doc_updated_at")),
        doc_updated_by: optional_string(fields.get("doc_updated_by")),
        dirty: normalize_dirty(fields.get("dirty")),
        id_source: normalize_id_source(fields.get("id_source")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_priority_normalization_is_total() {
        assert_eq!(normalize_priority_str("LOW"), Priority::Low);
        assert_eq!(normalize_priority_str("normal"), Priority::Normal);
        assert_eq!(normalize_priority_str("medium"), Priority::Med);
        assert_eq!(normalize_priority_str("urgent"), Priority::High);
        assert_eq!(normalize_priority_str("Immediate"), Priority::High);
        assert_eq!(normalize_priority_str("whenever"), Priority::Med);
        assert_eq!(normalize_priority(Some(&json!(4))), Priority::Med);
        assert_eq!(normalize_priority(Some(&json!(null))), Priority::Med);
        assert_eq!(normalize_priority(None), Priority::Med);
    }

    #[test]
    fn test_depends_on_sentinel_is_empty() {
        assert!(normalize_depends_on(Some(&json!(["[]"]))).is_empty());
        assert_eq!(
            normalize_depends_on(Some(&json!(["b", "a", "[]"]))),
            vec!["b", "a", "[]"]
        );
        assert_eq!(
            normalize_depends_on(Some(&json!(["x", 3, null, "y"]))),
            vec!["x", "y"]
        );
    }

    #[test]
    fn test_commit_requires_both_strings() {
        assert!(normalize_commit(Some(&json!({"hash": "abc"}))).is_none());
        assert!(normalize_commit(Some(&json!({"hash": "abc", "message": 1}))).is_none());
        let commit = normalize_commit(Some(&json!({"hash": "abc", "message": "fix"}))).unwrap();
        assert_eq!(commit.hash, "abc");
    }

    #[test]
    fn test_comments_drop_incomplete_entries() {
        let comments = normalize_comments(Some(&json!([
            {"author": "a", "body": "b"},
            {"author": "only"},
            "plain",
            {"author": "c", "body": "d"}
        ])));
        assert_eq!(
            comments,
            vec![TaskComment::new("a", "b"), TaskComment::new("c", "d")]
        );
    }

    #[test]
    fn test_normalize_task_defaults() {
        let task = normalize_task(
            &fields(json!({"title": 42, "status": "weird", "tags": "nope"})),
            Some("202601011200-ABCD"),
        )
        .unwrap();
        assert_eq!(task.id, "202601011200-ABCD");
        assert_eq!(task.title, "");
        assert_eq!(task.status, TaskStatus::Todo);
        assert!(task.tags.is_empty());
        assert!(!task.dirty);
    }

    #[test]
    fn test_normalize_task_without_any_id() {
        assert!(normalize_task(&fields(json!({"title": "x"})), None).is_none());
        assert!(normalize_task(&fields(json!({"id": "  "})), Some("")).is_none());
    }

    #[test]
    fn test_normalize_task_reads_bookkeeping() {
        let task = normalize_task(
            &fields(json!({
                "id": "202601011200-ABCD",
                "dirty": true,
                "id_source": "custom",
                "doc_version": "2",
                "doc_updated_by": "  "
            })),
            None,
        )
        .unwrap();
        assert!(task.dirty);
        assert_eq!(task.id_source, Some(IdSource::Custom));
        assert_eq!(task.doc_version, Some(2));
        assert_eq!(task.doc_updated_by, None);
    }
}
