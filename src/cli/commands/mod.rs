//! Command implementations.

pub mod doc;
pub mod export;
pub mod sync;
pub mod tasks;
