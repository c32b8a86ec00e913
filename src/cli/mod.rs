//! CLI definitions using clap.

use std::future::Future;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::{EnvSnapshot, LoadedConfig, load_config};
use crate::error::{Error, Result};
use crate::model::TaskStatus;
use crate::model::task_id::{DEFAULT_ATTEMPTS, DEFAULT_SUFFIX_LEN};
use crate::storage::{Backend, open_backend};
use crate::sync::ConflictPolicy;

pub mod commands;

/// taskbridge - task records for coding agents, local or on Redmine
#[derive(Parser, Debug)]
#[command(name = "tb", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: nearest .taskbridge/config.json)
    #[arg(long, global = true, env = "TASKBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON (for agent integration)
    #[arg(long, alias = "robot", global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List tasks
    List {
        /// Only tasks in this status (TODO, DOING, BLOCKED, DONE)
        #[arg(long, value_parser = parse_status)]
        status: Option<TaskStatus>,

        /// Only tasks with unsynced local edits
        #[arg(long)]
        dirty: bool,
    },

    /// Show one task
    Show {
        /// Task id
        id: String,
    },

    /// Create a task
    Add {
        /// Task title
        title: String,

        /// Use this id instead of generating one
        #[arg(long)]
        id: Option<String>,

        /// Description
        #[arg(short, long)]
        description: Option<String>,

        /// Priority (low, normal, med, high)
        #[arg(short, long)]
        priority: Option<String>,

        /// Owner agent
        #[arg(long)]
        owner: Option<String>,

        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Generate an unused task id
    NewId {
        /// Random suffix length
        #[arg(long, default_value_t = DEFAULT_SUFFIX_LEN)]
        length: usize,

        /// Candidates to try before giving up
        #[arg(long, default_value_t = DEFAULT_ATTEMPTS)]
        attempts: usize,
    },

    /// Task summary doc
    Doc {
        #[command(subcommand)]
        command: DocCommands,
    },

    /// Write a checksummed JSON export of all tasks
    Export {
        /// Output path (default: .taskbridge/tasks.json under the project root)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Reconcile the local cache with Redmine
    Sync {
        /// push or pull
        direction: String,

        /// Conflict policy for pull (prefer-local, prefer-remote, diff, fail)
        #[arg(long, default_value_t = ConflictPolicy::Diff)]
        conflict: ConflictPolicy,

        /// Confirm a push
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum DocCommands {
    /// Print a task's doc
    Show {
        /// Task id
        id: String,
    },

    /// Replace a task's doc
    Set {
        /// Task id
        id: String,

        /// Doc text
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        text: Option<String>,

        /// Read the doc from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Who made the change
        #[arg(long)]
        by: Option<String>,
    },

    /// Bump doc metadata without changing the text
    Touch {
        /// Task id
        id: String,

        /// Who touched it
        #[arg(long)]
        by: Option<String>,
    },
}

fn parse_status(input: &str) -> std::result::Result<TaskStatus, String> {
    TaskStatus::parse(input).ok_or_else(|| format!("unknown status '{input}'"))
}

/// Per-invocation state shared by command handlers.
#[derive(Debug)]
pub struct Context {
    pub config: Option<PathBuf>,
    pub cwd: PathBuf,
    pub env: EnvSnapshot,
    pub json: bool,
    pub quiet: bool,
}

impl Context {
    /// Load configuration and open the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is malformed or the backend settings
    /// are incomplete.
    pub fn open(&self) -> Result<(LoadedConfig, Backend)> {
        let loaded = load_config(self.config.as_deref(), &self.cwd)?;
        let backend = open_backend(&loaded, &self.env)?;
        Ok((loaded, backend))
    }

    /// Resolve a user-supplied path against the working directory.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    /// Drive an async command body to completion.
    ///
    /// # Errors
    ///
    /// Returns the future's error, or `Other` if the runtime can't start.
    pub fn block_on<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;
        rt.block_on(fut)
    }
}
