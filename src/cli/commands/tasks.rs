//! Task commands: list, show, add, new-id.

use colored::Colorize;
use serde::Serialize;

use crate::cli::Context;
use crate::error::{Error, Result};
use crate::model::task_id::ensure_valid_task_id;
use crate::model::{IdSource, Task, TaskStatus, normalize_priority_str};
use crate::storage::TaskBackend;

#[derive(Serialize)]
struct TaskListOutput {
    backend: &'static str,
    count: usize,
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct NewIdOutput<'a> {
    id: &'a str,
}

/// Arguments for `tb add`.
#[derive(Debug, Default)]
pub struct AddArgs<'a> {
    pub title: &'a str,
    pub id: Option<&'a str>,
    pub description: Option<&'a str>,
    pub priority: Option<&'a str>,
    pub owner: Option<&'a str>,
    pub tags: &'a [String],
}

fn require_id_generation(backend: &impl TaskBackend) -> Result<()> {
    if backend.capabilities().generate_task_id {
        Ok(())
    } else {
        Err(Error::Unsupported {
            backend: backend.name(),
            capability: "generate_task_id",
        })
    }
}

/// Execute `tb list`.
///
/// # Errors
///
/// Returns an error if the backend can't be opened or listed.
pub fn list(ctx: &Context, status: Option<TaskStatus>, dirty_only: bool) -> Result<()> {
    let (_, backend) = ctx.open()?;
    let mut tasks = ctx.block_on(backend.list_tasks())?;
    tasks.retain(|t| status.is_none_or(|s| t.status == s) && (!dirty_only || t.dirty));

    if ctx.json {
        let output = TaskListOutput {
            backend: backend.name(),
            count: tasks.len(),
            tasks,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if tasks.is_empty() {
        println!("No tasks found.");
    } else {
        print_task_list(&tasks);
    }
    Ok(())
}

fn print_task_list(tasks: &[Task]) {
    println!("Tasks ({} found):", tasks.len());
    println!();
    for task in tasks {
        let status_icon = match task.status {
            TaskStatus::Todo => "○",
            TaskStatus::Doing => "●",
            TaskStatus::Blocked => "⊘",
            TaskStatus::Done => "✓",
        };
        let dirty = if task.dirty {
            " *".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "{} [{}] {} {}{}",
            status_icon,
            task.id.dimmed(),
            task.title,
            format!("({})", task.priority).dimmed(),
            dirty
        );
        if !task.owner.is_empty() {
            println!("        owner: {}", task.owner);
        }
    }
}

/// Execute `tb show`.
///
/// # Errors
///
/// Returns `TaskNotFound` if no task has this id.
pub fn show(ctx: &Context, id: &str) -> Result<()> {
    let (_, backend) = ctx.open()?;
    let task = ctx
        .block_on(backend.get_task(id))?
        .ok_or_else(|| Error::TaskNotFound { id: id.to_string() })?;

    if ctx.json {
        println!("{}", serde_json::to_string(&task)?);
        return Ok(());
    }

    println!("[{}] {}", task.id, task.title.bold());
    println!();
    println!("Status:   {}", task.status);
    println!("Priority: {}", task.priority);
    if !task.owner.is_empty() {
        println!("Owner:    {}", task.owner);
    }
    if !task.tags.is_empty() {
        println!("Tags:     {}", task.tags.join(", "));
    }
    if !task.depends_on.is_empty() {
        println!("Depends:  {}", task.depends_on.join(", "));
    }
    if task.dirty {
        println!("{}", "Unsynced local changes".yellow());
    }
    if !task.description.is_empty() {
        println!();
        println!("Description:");
        println!("{}", task.description);
    }
    if !task.verify.is_empty() {
        println!();
        println!("Verify:");
        for step in &task.verify {
            println!("  - {step}");
        }
    }
    if let Some(commit) = &task.commit {
        println!();
        println!("Commit:   {} {}", commit.hash, commit.message);
    }
    if !task.comments.is_empty() {
        println!();
        println!("Comments ({}):", task.comments.len());
        for comment in &task.comments {
            println!("  {}: {}", comment.author.cyan(), comment.body);
        }
    }
    Ok(())
}

/// Execute `tb add`.
///
/// # Errors
///
/// Returns an error for an invalid or taken id, or a failed write.
pub fn add(ctx: &Context, args: &AddArgs<'_>) -> Result<()> {
    let (_, backend) = ctx.open()?;

    let task = ctx.block_on(async {
        let (id, source) = match args.id {
            Some(id) => {
                ensure_valid_task_id(id)?;
                if backend.get_task(id).await?.is_some() {
                    return Err(Error::InvalidArgument(format!("task {id} already exists")));
                }
                (id.to_string(), IdSource::Custom)
            }
            None => {
                require_id_generation(&backend)?;
                let id = backend
                    .generate_task_id(
                        crate::model::task_id::DEFAULT_SUFFIX_LEN,
                        crate::model::task_id::DEFAULT_ATTEMPTS,
                    )
                    .await?;
                (id, IdSource::Generated)
            }
        };

        let mut task = Task::new(id, args.title);
        task.description = args.description.unwrap_or_default().to_string();
        task.priority = args.priority.map(normalize_priority_str).unwrap_or_default();
        task.owner = args.owner.unwrap_or_default().to_string();
        task.tags = args.tags.to_vec();
        task.id_source = Some(source);
        backend.write_task(&task).await?;
        // Re-read so the output reflects what the store persisted.
        Ok::<_, Error>(backend.get_task(&task.id).await?.unwrap_or(task))
    })?;

    if ctx.json {
        println!("{}", serde_json::to_string(&task)?);
    } else if ctx.quiet {
        println!("{}", task.id);
    } else {
        println!("Created task: {} [{}]", task.title, task.id);
        if task.dirty {
            println!("  {}", "Saved locally; run `tb sync push` when Redmine is back".yellow());
        }
    }
    Ok(())
}

/// Execute `tb new-id`.
///
/// # Errors
///
/// Returns `InvalidLength` or `TaskIdExhausted` from the generator.
pub fn new_id(ctx: &Context, length: usize, attempts: usize) -> Result<()> {
    let (_, backend) = ctx.open()?;
    require_id_generation(&backend)?;
    let id = ctx.block_on(backend.generate_task_id(length, attempts))?;

    if ctx.json {
        println!("{}", serde_json::to_string(&NewIdOutput { id: &id })?);
    } else {
        println!("{id}");
    }
    Ok(())
}
