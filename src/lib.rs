//! # homesync - personal file synchronization
//!
//! Snapshot a local tree, compare it with the snapshot stored next to a
//! remote copy, and converge both sides.
//!
//! The pipeline is:
//! 1. [`scanner::Explorer`] walks the root with a pool of workers and builds an [`Index`]
//! 2. [`diff::Comparator`] merges the local and remote snapshots into a [`diff::SyncPlan`]
//! 3. [`executor::Executor`] applies the plan against a [`remote::Backend`]

// Module declarations
pub mod commands;
pub mod config;
pub mod diff;
pub mod executor;
pub mod index;
pub mod logging;
pub mod remote;
pub mod scanner;
pub mod types;
pub mod ui;

// Re-export commonly used types
pub use config::Config;
pub use index::Index;
pub use types::{FileNode, SyncError, SyncState, Task, Tree};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
