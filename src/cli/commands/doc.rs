//! Doc commands: show, set, touch.

use std::path::Path;

use serde::Serialize;

use crate::cli::{Context, DocCommands};
use crate::error::{Error, Result};
use crate::model::Task;
use crate::storage::TaskBackend;

#[derive(Serialize)]
struct DocOutput<'a> {
    id: &'a str,
    doc: Option<&'a str>,
}

#[derive(Serialize)]
struct DocMetaOutput<'a> {
    id: &'a str,
    doc_version: Option<u32>,
    doc_updated_at: Option<&'a str>,
    doc_updated_by: Option<&'a str>,
    dirty: bool,
}

/// Execute doc subcommands.
///
/// # Errors
///
/// Returns `Unsupported` if the backend has no doc support, or the
/// underlying store error.
pub fn execute(ctx: &Context, command: &DocCommands) -> Result<()> {
    let (_, backend) = ctx.open()?;
    if !backend.capabilities().task_docs {
        return Err(Error::Unsupported {
            backend: backend.name(),
            capability: "task docs",
        });
    }

    match command {
        DocCommands::Show { id } => show(ctx, &backend, id),
        DocCommands::Set { id, text, file, by } => {
            let doc = match (text, file) {
                (Some(text), _) => text.clone(),
                (None, Some(path)) => read_doc_file(&ctx.resolve(path))?,
                (None, None) => {
                    return Err(Error::InvalidArgument("doc text or --file is required".into()));
                }
            };
            let task = ctx.block_on(backend.set_task_doc(id, &doc, by.as_deref()))?;
            print_meta(ctx, &task, "Updated doc")
        }
        DocCommands::Touch { id, by } => {
            let task = ctx.block_on(backend.touch_task_doc_metadata(id, by.as_deref()))?;
            print_meta(ctx, &task, "Touched doc")
        }
    }
}

fn read_doc_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidArgument(format!("cannot read doc file {}: {e}", path.display()))
    })
}

fn show(ctx: &Context, backend: &impl TaskBackend, id: &str) -> Result<()> {
    let doc = ctx.block_on(async {
        let doc = backend.get_task_doc(id).await?;
        if doc.is_none() && backend.get_task(id).await?.is_none() {
            return Err(Error::TaskNotFound { id: id.to_string() });
        }
        Ok(doc)
    })?;

    if ctx.json {
        let output = DocOutput {
            id,
            doc: doc.as_deref(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        match doc {
            Some(doc) => println!("{doc}"),
            None => println!("No doc for {id}."),
        }
    }
    Ok(())
}

fn print_meta(ctx: &Context, task: &Task, verb: &str) -> Result<()> {
    if ctx.json {
        let output = DocMetaOutput {
            id: &task.id,
            doc_version: task.doc_version,
            doc_updated_at: task.doc_updated_at.as_deref(),
            doc_updated_by: task.doc_updated_by.as_deref(),
            dirty: task.dirty,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if !ctx.quiet {
        println!(
            "{verb} for {} (by {}, at {})",
            task.id,
            task.doc_updated_by.as_deref().unwrap_or("-"),
            task.doc_updated_at.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
