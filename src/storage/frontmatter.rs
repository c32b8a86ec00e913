//! Markdown-with-frontmatter codec for task records.
//!
//! ```text
//! ---
//! id: 202601311245-7KQ3
//! title: Wire up sync
//! ---
//! ## Summary
//! ...
//! ```

use serde_json::{Map, Value};

use crate::error::{Error, Result};

const DELIMITER: &str = "---";

/// Split a record into its frontmatter mapping and body.
///
/// # Errors
///
/// Returns an error when the text does not open with a delimited YAML block,
/// or when that block is not a mapping.
pub fn parse_record(text: &str) -> Result<(Map<String, Value>, String)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.split_inclusive('\n');

    match lines.next() {
        Some(first) if first.trim_end() == DELIMITER => {}
        _ => return Err(Error::Other("record has no frontmatter".into())),
    }

    let mut yaml = String::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim_end() == DELIMITER {
            closed = true;
            break;
        }
        yaml.push_str(line);
    }
    if !closed {
        return Err(Error::Other("unterminated frontmatter".into()));
    }

    let body: String = lines.collect();
    let body = body.strip_prefix('\n').unwrap_or(&body).to_string();

    if yaml.trim().is_empty() {
        return Ok((Map::new(), body));
    }

    match serde_yaml::from_str::<Value>(&yaml)? {
        Value::Object(map) => Ok((map, body)),
        Value::Null => Ok((Map::new(), body)),
        _ => Err(Error::Other("frontmatter is not a mapping".into())),
    }
}

/// Render a record from frontmatter and body.
///
/// # Errors
///
/// Returns an error if the frontmatter cannot be serialized as YAML.
pub fn render_record(frontmatter: &Map<String, Value>, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(frontmatter)?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 16);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
    Ok(out)
}
