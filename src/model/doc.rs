//! Task documentation section and its provenance metadata.
//!
//! A task record body is free markdown. The only part this crate owns is the
//! `## Summary` section, which ends where the auto-generated section starts
//! (or at end of body). Text before the Summary heading and the whole
//! auto-generated section are preserved verbatim on every merge.

use chrono::Utc;

use super::task::{DOC_VERSION, Task};

pub const DOC_SECTION_HEADING: &str = "## Summary";
pub const AUTO_SECTION_HEADING: &str = "## Changes Summary (auto)";

/// Byte offset of the first line that is exactly `heading`.
fn find_heading(body: &str, heading: &str) -> Option<usize> {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if line.trim_end() == heading {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Strip a leading Summary heading that callers sometimes include.
fn strip_doc_heading(doc: &str) -> &str {
    let trimmed = doc.trim();
    trimmed
        .strip_prefix(DOC_SECTION_HEADING)
        .map_or(trimmed, str::trim)
}

/// Normalized doc text as it will be persisted.
#[must_use]
pub fn normalize_doc(doc: &str) -> String {
    strip_doc_heading(doc).to_string()
}

/// Extract the Summary section content, if the body has one.
#[must_use]
pub fn extract_doc(body: &str) -> Option<String> {
    let start = find_heading(body, DOC_SECTION_HEADING)?;
    let after_heading = &body[start + DOC_SECTION_HEADING.len()..];
    let end = find_heading(after_heading, AUTO_SECTION_HEADING).unwrap_or(after_heading.len());
    Some(after_heading[..end].trim().to_string())
}

/// Replace (or append) the Summary section with `doc`.
#[must_use]
pub fn merge_doc(body: &str, doc: &str) -> String {
    let auto_start = find_heading(body, AUTO_SECTION_HEADING);
    let (content, auto) = match auto_start {
        Some(at) => body.split_at(at),
        None => (body, ""),
    };
    let prefix = match find_heading(content, DOC_SECTION_HEADING) {
        Some(at) => &content[..at],
        None => content,
    };

    let mut out = String::new();
    let prefix = prefix.trim_end();
    if !prefix.is_empty() {
        out.push_str(prefix);
        out.push_str("\n\n");
    }
    out.push_str(DOC_SECTION_HEADING);
    out.push_str("\n\n");
    let doc = strip_doc_heading(doc);
    if !doc.is_empty() {
        out.push_str(doc);
        out.push('\n');
    }
    if !auto.is_empty() {
        out.push('\n');
        out.push_str(auto.trim_end());
        out.push('\n');
    }
    out
}

/// Whitespace-insensitive comparison of two doc bodies.
#[must_use]
pub fn doc_changed(old: Option<&str>, new: Option<&str>) -> bool {
    let squash = |s: Option<&str>| -> String {
        s.map(|d| strip_doc_heading(d).split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
    };
    squash(old) != squash(new)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Who gets credited for a doc change.
///
/// Precedence: explicit caller value, last comment author, existing
/// persisted value, task owner, then `default_identity`. Blank strings at
/// any rung count as absent.
#[must_use]
pub fn resolve_doc_updated_by(
    explicit: Option<&str>,
    task: &Task,
    existing: Option<&str>,
    default_identity: &str,
) -> String {
    non_blank(explicit)
        .or_else(|| non_blank(task.comments.last().map(|c| c.author.as_str())))
        .or_else(|| non_blank(existing))
        .or_else(|| non_blank(Some(task.owner.as_str())))
        .unwrap_or(default_identity)
        .to_string()
}

/// How a write should treat doc metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocTouch {
    /// Bump `doc_updated_*` only if the doc content materially changed.
    IfChanged,
    /// Always bump (provenance refresh without content change).
    Always,
}

/// Apply doc-metadata rules to `task` before it is persisted.
///
/// `previous` is the currently persisted copy, if any. Metadata the caller
/// did not supply is inherited from it; `doc_version` is always rewritten to
/// the current schema value.
pub fn apply_doc_metadata(
    task: &mut Task,
    previous: Option<&Task>,
    updated_by: Option<&str>,
    default_identity: &str,
    touch: DocTouch,
) {
    let previous_by = previous.and_then(|p| p.doc_updated_by.clone());
    // A doc_updated_by on the task only counts as explicit when it differs
    // from what is already persisted.
    let supplied_by = task
        .doc_updated_by
        .clone()
        .filter(|by| previous_by.as_deref() != Some(by.as_str()));
    let explicit = non_blank(updated_by)
        .map(String::from)
        .or(supplied_by);

    if task.doc_updated_at.is_none() {
        task.doc_updated_at = previous.and_then(|p| p.doc_updated_at.clone());
    }
    if task.doc_updated_by.is_none() {
        task.doc_updated_by = previous.and_then(|p| p.doc_updated_by.clone());
    }
    if task.doc.is_none() {
        task.doc = previous.and_then(|p| p.doc.clone());
    }
    task.doc = task.doc.as_deref().map(normalize_doc);
    task.doc_version = Some(DOC_VERSION);

    let changed = task.doc.is_some()
        && doc_changed(
            previous.and_then(|p| p.doc.as_deref()),
            task.doc.as_deref(),
        );

    if changed || touch == DocTouch::Always {
        task.doc_updated_by = Some(resolve_doc_updated_by(
            explicit.as_deref(),
            task,
            previous_by.as_deref(),
            default_identity,
        ));
        task.doc_updated_at = Some(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::TaskComment;

    #[test]
    fn test_extract_doc_stops_at_auto_section() {
        let body = "Intro\n\n## Summary\n\nDo the thing.\n\n## Changes Summary (auto)\n\n- generated\n";
        assert_eq!(extract_doc(body).as_deref(), Some("Do the thing."));
        assert_eq!(extract_doc("no summary here"), None);
    }

    #[test]
    fn test_merge_doc_preserves_prefix_and_auto_section() {
        let body = "Intro\n\n## Summary\n\nold\n\n## Changes Summary (auto)\n\n- generated\n";
        let merged = merge_doc(body, "new text");
        assert!(merged.starts_with("Intro\n\n## Summary\n\nnew text\n"));
        assert!(merged.ends_with("## Changes Summary (auto)\n\n- generated\n"));
        assert!(!merged.contains("old"));
        assert_eq!(extract_doc(&merged).as_deref(), Some("new text"));
    }

    #[test]
    fn test_merge_doc_into_empty_body() {
        let merged = merge_doc("", "## Summary\n\nhello");
        assert_eq!(merged, "## Summary\n\nhello\n");
        assert_eq!(extract_doc(&merged).as_deref(), Some("hello"));
    }

    #[test]
    fn test_doc_changed_ignores_whitespace() {
        assert!(!doc_changed(Some("a  b\n c"), Some("a b c")));
        assert!(!doc_changed(Some("## Summary\n\nx"), Some("x")));
        assert!(doc_changed(Some("a b"), Some("a c")));
        assert!(doc_changed(None, Some("a")));
    }

    #[test]
    fn test_updated_by_ladder() {
        let mut task = Task::new("202601011200-ABCD", "t");
        assert_eq!(resolve_doc_updated_by(None, &task, None, "agent"), "agent");

        task.owner = "owner".into();
        assert_eq!(resolve_doc_updated_by(None, &task, None, "agent"), "owner");
        assert_eq!(
            resolve_doc_updated_by(None, &task, Some("prior"), "agent"),
            "prior"
        );

        task.comments.push(TaskComment::new("commenter", "hi"));
        assert_eq!(
            resolve_doc_updated_by(None, &task, Some("prior"), "agent"),
            "commenter"
        );
        assert_eq!(
            resolve_doc_updated_by(Some("  "), &task, Some("prior"), "agent"),
            "commenter"
        );
        assert_eq!(
            resolve_doc_updated_by(Some("me"), &task, Some("prior"), "agent"),
            "me"
        );
    }

    #[test]
    fn test_metadata_untouched_when_doc_unchanged() {
        let mut previous = Task::new("202601011200-ABCD", "t");
        previous.doc = Some("same content".into());
        previous.doc_updated_at = Some("2026-01-01T00:00:00Z".into());
        previous.doc_updated_by = Some("first".into());

        let mut next = previous.clone();
        next.doc = Some("same   content\n".into());
        next.doc_updated_at = None;
        next.doc_updated_by = None;
        apply_doc_metadata(&mut next, Some(&previous), Some("second"), "agent", DocTouch::IfChanged);

        assert_eq!(next.doc_updated_at.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert_eq!(next.doc_updated_by.as_deref(), Some("first"));
        assert_eq!(next.doc_version, Some(DOC_VERSION));
    }

    #[test]
    fn test_metadata_bumped_on_change_and_on_touch() {
        let mut previous = Task::new("202601011200-ABCD", "t");
        previous.doc = Some("v1".into());
        previous.doc_updated_at = Some("2026-01-01T00:00:00Z".into());
        previous.doc_updated_by = Some("first".into());

        let mut changed = previous.clone();
        changed.doc = Some("v2".into());
        apply_doc_metadata(&mut changed, Some(&previous), Some("second"), "agent", DocTouch::IfChanged);
        assert_eq!(changed.doc_updated_by.as_deref(), Some("second"));
        assert_ne!(changed.doc_updated_at.as_deref(), Some("2026-01-01T00:00:00Z"));

        let mut supplied = previous.clone();
        supplied.doc = Some("v3".into());
        supplied.doc_updated_by = Some("caller".into());
        supplied.comments.push(TaskComment::new("commenter", "hi"));
        apply_doc_metadata(&mut supplied, Some(&previous), None, "agent", DocTouch::IfChanged);
        assert_eq!(supplied.doc_updated_by.as_deref(), Some("caller"));

        let mut touched = previous.clone();
        apply_doc_metadata(&mut touched, Some(&previous), None, "agent", DocTouch::Always);
        assert_eq!(touched.doc_updated_by.as_deref(), Some("first"));
        assert_ne!(touched.doc_updated_at.as_deref(), Some("2026-01-01T00:00:00Z"));
    }
}
