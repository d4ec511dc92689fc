//! Core type definitions for homesync

mod error;
mod node;
pub mod path;
mod task;
mod tree;

pub use error::{Result, SyncError};
pub use node::{FileKind, FileMode, FileNode, Identity, NodeId, SyncState};
pub use task::{Side, Task};
pub use tree::Tree;
