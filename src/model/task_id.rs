//! Task id format and collision-free generation.
//!
//! Ids look like `202601311245-7KQ3`: the UTC minute the id was minted,
//! a dash, then a random suffix drawn from an alphabet without the
//! visually confusable `0`, `1`, `I` and `O`.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Suffix alphabet. Exactly 32 symbols so a random byte maps uniformly.
pub const TASK_ID_ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Minimum suffix length accepted by the generator and the validator.
pub const MIN_SUFFIX_LEN: usize = 4;

pub const DEFAULT_SUFFIX_LEN: usize = 6;
pub const DEFAULT_ATTEMPTS: usize = 1000;

const TIMESTAMP_LEN: usize = 12;

/// Check the `YYYYMMDDHHMM-XXXX+` shape.
#[must_use]
pub fn is_valid_task_id(id: &str) -> bool {
    let Some((stamp, suffix)) = id.split_once('-') else {
        return false;
    };
    stamp.len() == TIMESTAMP_LEN
        && stamp.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() >= MIN_SUFFIX_LEN
        && suffix.bytes().all(|b| TASK_ID_ALPHABET.contains(&b))
}

/// Fail with `InvalidTaskId` unless the id is well formed.
///
/// # Errors
///
/// Returns `MissingTaskId` for a blank id and `InvalidTaskId` otherwise.
pub fn ensure_valid_task_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::MissingTaskId);
    }
    if !is_valid_task_id(id) {
        return Err(Error::InvalidTaskId { id: id.to_string() });
    }
    Ok(())
}

/// Calendar date (`YYYY-MM-DD`) encoded in a well-formed id.
#[must_use]
pub fn task_id_date(id: &str) -> Option<String> {
    if !is_valid_task_id(id) {
        return None;
    }
    let date = chrono::NaiveDate::parse_from_str(&id[..8], "%Y%m%d").ok()?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Random suffix of `length` symbols from [`TASK_ID_ALPHABET`].
#[must_use]
pub fn random_suffix(length: usize) -> String {
    let mut out = String::with_capacity(length);
    while out.len() < length {
        let bytes = *uuid::Uuid::new_v4().as_bytes();
        for b in bytes {
            if out.len() == length {
                break;
            }
            out.push(char::from(TASK_ID_ALPHABET[usize::from(b) % TASK_ID_ALPHABET.len()]));
        }
    }
    out
}

/// Format a candidate id for the given instant.
#[must_use]
pub fn format_task_id(now: DateTime<Utc>, length: usize) -> String {
    format!("{}-{}", now.format("%Y%m%d%H%M"), random_suffix(length))
}

/// Mint a new id, probing `is_available` until a free one turns up.
///
/// The predicate is store specific (a directory probe locally, a lookup
/// plus a cache probe remotely) and may itself fail; its errors propagate.
///
/// # Errors
///
/// `InvalidLength` when `length < 4`, `TaskIdExhausted` after `attempts`
/// rejected candidates.
pub async fn generate_task_id<F, Fut>(
    length: usize,
    attempts: usize,
    mut is_available: F,
) -> Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    if length < MIN_SUFFIX_LEN {
        return Err(Error::InvalidLength { length });
    }

    for _ in 0..attempts {
        let candidate = format_task_id(Utc::now(), length);
        if is_available(candidate.clone()).await? {
            return Ok(candidate);
        }
        tracing::debug!(candidate = %candidate, "task id already taken");
    }

    Err(Error::TaskIdExhausted { attempts })
}
