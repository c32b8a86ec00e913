//! Sync command implementation.

use crate::cli::Context;
use crate::error::{Error, Result};
use crate::storage::TaskBackend;
use crate::sync::{ConflictPolicy, SyncOptions};

/// Execute `tb sync <direction>`.
///
/// Progress and conflict diffs go to stdout unless `--quiet` or `--json`;
/// in JSON mode the report is printed once at the end.
///
/// # Errors
///
/// Returns `Unsupported` for a backend without sync, `SyncConflict` when
/// pull stops on conflicts, or the underlying backend error.
pub fn execute(ctx: &Context, direction: &str, conflict: ConflictPolicy, yes: bool) -> Result<()> {
    let (_, backend) = ctx.open()?;
    if !backend.capabilities().sync {
        return Err(Error::Unsupported {
            backend: backend.name(),
            capability: "sync",
        });
    }

    let options = SyncOptions {
        direction: direction.to_string(),
        conflict,
        confirm: yes,
        quiet: ctx.quiet || ctx.json,
    };
    let report = ctx.block_on(backend.sync(&options))?;

    if ctx.json {
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}
