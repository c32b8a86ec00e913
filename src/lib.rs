//! taskbridge - task records for coding agents
//!
//! Tasks live either in a local file tree (one `README.md` with YAML
//! frontmatter per task) or in Redmine, with the file tree doubling as an
//! offline cache that a sync pass reconciles.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Task type, normalization, ids and doc metadata
//! - [`storage`] - `TaskBackend` trait and the local file-tree store
//! - [`remote`] - Redmine REST client and the remote store
//! - [`sync`] - Push/pull reconciliation and checksummed export
//! - [`config`] - Configuration files and environment overrides
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
