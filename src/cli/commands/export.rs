//! Export command implementation.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::Context;
use crate::config::CONFIG_DIR;
use crate::error::{Error, Result};
use crate::storage::TaskBackend;

const DEFAULT_EXPORT_FILE: &str = "tasks.json";

#[derive(Serialize)]
struct ExportOutput<'a> {
    path: String,
    count: usize,
    checksum: &'a str,
}

/// Execute `tb export`.
///
/// # Errors
///
/// Returns `Unsupported` for a backend without export, or the write error.
pub fn execute(ctx: &Context, out: Option<&PathBuf>) -> Result<()> {
    let (loaded, backend) = ctx.open()?;
    if !backend.capabilities().export_tasks_json {
        return Err(Error::Unsupported {
            backend: backend.name(),
            capability: "export_tasks_json",
        });
    }

    let path = out.map_or_else(
        || loaded.project_root.join(CONFIG_DIR).join(DEFAULT_EXPORT_FILE),
        |p| ctx.resolve(p),
    );
    let export = ctx.block_on(backend.export_tasks_json(&path))?;

    if ctx.json {
        let output = ExportOutput {
            path: path.display().to_string(),
            count: export.tasks.len(),
            checksum: &export.meta.checksum,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if !ctx.quiet {
        println!("Exported {} tasks to {}", export.tasks.len(), path.display());
        println!("  Checksum: sha256:{}", export.meta.checksum);
    }
    Ok(())
}
