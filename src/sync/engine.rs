//! Push / pull reconciliation between Redmine and the local cache.
//!
//! A cached task is either clean (mirrors the last-known remote state) or
//! dirty (changed locally, not yet on Redmine).
//!
//! - **push** writes every dirty task to Redmine. It is a dry run unless
//!   `confirm` is set: the pending list is printed and the call fails.
//! - **pull** overwrites clean cache entries with remote state. A dirty
//!   entry that matches remote just loses its flag. One that differs is a
//!   conflict, resolved by [`ConflictPolicy`].
//!
//! Pull plans every task before writing anything, so a `diff` or `fail`
//! outcome leaves both stores untouched.

use colored::Colorize;
use similar::TextDiff;

use crate::error::{Error, Result};
use crate::model::Task;
use crate::model::doc::DocTouch;
use crate::remote::client::HttpTransport;
use crate::remote::store::RemoteTaskStore;
use crate::sync::types::{ConflictPolicy, SyncDirection, SyncOptions, SyncReport};

/// What pull will do to one task.
enum PullAction {
    /// Cache is clean or absent: take remote.
    Refresh(Task),
    /// Dirty but identical to remote: clear the flag.
    Clear(Task),
    /// Conflict resolved for local: send it to Redmine.
    PushLocal(Task),
    /// Conflict resolved for remote: discard the local edit.
    TakeRemote(Task),
}

/// Unified diff of the canonical JSON of two versions of a task.
#[must_use]
pub fn render_conflict_diff(local: &Task, remote: &Task) -> String {
    let local_text = local.canonical_pretty() + "\n";
    let remote_text = remote.canonical_pretty() + "\n";
    TextDiff::from_lines(&local_text, &remote_text)
        .unified_diff()
        .context_radius(3)
        .header(&format!("local/{}", local.id), &format!("remote/{}", remote.id))
        .to_string()
}

/// Run one sync pass.
///
/// # Errors
///
/// `Backend` for an unknown direction, a missing cache or an unconfirmed
/// push; `SyncConflict` when pull meets a conflict under `diff` / `fail`;
/// request errors from Redmine.
pub async fn run_sync<T: HttpTransport>(
    store: &RemoteTaskStore<T>,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let direction = SyncDirection::parse(&options.direction)?;
    let report = match direction {
        SyncDirection::Push => push(store, options).await?,
        SyncDirection::Pull => pull(store, options).await?,
    };
    tracing::info!(
        direction = direction.as_str(),
        pushed = report.pushed.len(),
        pulled = report.pulled.len(),
        cleared = report.cleared.len(),
        unchanged = report.unchanged,
        "sync complete"
    );
    Ok(report)
}

async fn push<T: HttpTransport>(store: &RemoteTaskStore<T>, options: &SyncOptions) -> Result<SyncReport> {
    let cache = store.require_cache("sync push")?;
    let mut report = SyncReport::new(SyncDirection::Push);
    let dirty = cache.load_dirty()?;

    if dirty.is_empty() {
        if !options.quiet {
            println!("Nothing to push.");
        }
        return Ok(report);
    }

    if !options.confirm {
        if !options.quiet {
            println!("{} task(s) pending push:", dirty.len().to_string().bold());
            for task in &dirty {
                println!("  {} {}", task.id.cyan(), task.title);
            }
        }
        return Err(Error::PushNotConfirmed {
            ids: dirty.into_iter().map(|t| t.id).collect(),
        });
    }

    for (i, task) in dirty.iter().enumerate() {
        let pushed = store.push_task(task, None, DocTouch::IfChanged).await?;
        cache.save_snapshot(&pushed)?;
        if !options.quiet {
            println!("{} {}", "pushed".green(), task.id);
        }
        report.pushed.push(task.id.clone());
        store.pace(i + 1, dirty.len()).await;
    }
    Ok(report)
}

async fn pull<T: HttpTransport>(store: &RemoteTaskStore<T>, options: &SyncOptions) -> Result<SyncReport> {
    let cache = store.require_cache("sync pull")?;
    let mut report = SyncReport::new(SyncDirection::Pull);
    let remote_tasks = store.list_tasks_remote().await?;

    let mut plan = Vec::new();
    let mut conflicts: Vec<(Task, Task)> = Vec::new();
    for remote in remote_tasks {
        let Some(local) = cache.load(&remote.id)? else {
            plan.push(PullAction::Refresh(remote));
            continue;
        };
        let same = local.canonical_value() == remote.canonical_value();
        if !local.dirty {
            if same {
                report.unchanged += 1;
            } else {
                plan.push(PullAction::Refresh(remote));
            }
            continue;
        }
        if same {
            plan.push(PullAction::Clear(remote));
            continue;
        }
        match options.conflict {
            ConflictPolicy::PreferLocal => plan.push(PullAction::PushLocal(local)),
            ConflictPolicy::PreferRemote => plan.push(PullAction::TakeRemote(remote)),
            ConflictPolicy::Diff | ConflictPolicy::Fail => conflicts.push((local, remote)),
        }
    }

    if !conflicts.is_empty() {
        let ids: Vec<String> = conflicts.iter().map(|(local, _)| local.id.clone()).collect();
        let diff = (options.conflict == ConflictPolicy::Diff).then(|| {
            conflicts
                .iter()
                .map(|(local, remote)| render_conflict_diff(local, remote))
                .collect::<String>()
        });
        if let Some(diff) = &diff {
            if !options.quiet {
                println!("{}", "Conflicting tasks (local vs remote):".yellow());
                print!("{diff}");
            }
        }
        return Err(Error::SyncConflict { ids, diff });
    }

    let total = plan.len();
    for (i, action) in plan.into_iter().enumerate() {
        match action {
            PullAction::Refresh(remote) => {
                cache.save_snapshot(&remote)?;
                report.pulled.push(remote.id);
            }
            PullAction::Clear(remote) => {
                cache.save_snapshot(&remote)?;
                report.cleared.push(remote.id);
            }
            PullAction::TakeRemote(remote) => {
                cache.save_snapshot(&remote)?;
                if !options.quiet {
                    println!("{} {} (local edit discarded)", "took remote".yellow(), remote.id);
                }
                report.pulled.push(remote.id);
            }
            PullAction::PushLocal(local) => {
                let pushed = store.push_task(&local, None, DocTouch::IfChanged).await?;
                cache.save_snapshot(&pushed)?;
                if !options.quiet {
                    println!("{} {}", "kept local".green(), local.id);
                }
                report.pushed.push(local.id);
                store.pace(i + 1, total).await;
            }
        }
    }

    if !options.quiet {
        println!(
            "Pulled {}, cleared {}, pushed {}, unchanged {}.",
            report.pulled.len(),
            report.cleared.len(),
            report.pushed.len(),
            report.unchanged
        );
    }
    Ok(report)
}
