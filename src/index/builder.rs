//! IndexBuilder - Assembles a snapshot from a stream of directory listings

use super::Index;
use crate::types::{path, FileNode, NodeId, Result, SyncError, Tree};
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

/// The finalized contents of one directory, produced by the explorer
#[derive(Debug)]
pub struct DirectoryListing {
    /// Virtual path of the listed directory
    pub path: String,
    /// One node per entry, in any order
    pub entries: Vec<FileNode>,
}

#[derive(Debug)]
struct BuildState {
    tree: Tree,
    /// Listed directories
    dirs: HashMap<String, NodeId>,
    /// Directories present in the tree whose listing has not arrived yet
    awaiting: HashMap<String, NodeId>,
    /// Listings that arrived before their directory node did
    early: HashMap<String, Vec<FileNode>>,
}

impl BuildState {
    fn insert(&mut self, listing: DirectoryListing) {
        let mut work = vec![listing];
        while let Some(DirectoryListing { path, entries }) = work.pop() {
            let Some(id) = self.awaiting.remove(&path) else {
                self.early.insert(path, entries);
                continue;
            };

            let ids = self.tree.attach_children(id, entries);
            self.dirs.insert(path, id);

            for child in ids {
                let node = self.tree.node(child);
                // ignored directories are never listed
                if !node.is_dir() || node.children.is_none() {
                    continue;
                }
                let child_path = node.path.clone();
                match self.early.remove(&child_path) {
                    Some(entries) => {
                        self.awaiting.insert(child_path.clone(), child);
                        work.push(DirectoryListing {
                            path: child_path,
                            entries,
                        });
                    }
                    None => {
                        self.awaiting.insert(child_path, child);
                    }
                }
            }
        }
    }
}

/// Builds an [`Index`] from listings arriving on a channel
///
/// The lookup state sits behind one reader/writer lock that is held only for
/// a single listing at a time, so readers observe whole directories or
/// nothing.
#[derive(Debug)]
pub struct IndexBuilder {
    state: RwLock<BuildState>,
}

impl IndexBuilder {
    /// Start a snapshot whose root is `root`
    pub fn new(mut root: FileNode) -> Self {
        root.path = path::ROOT.to_string();
        let tree = Tree::new(root);
        let mut awaiting = HashMap::new();
        awaiting.insert(path::ROOT.to_string(), tree.root());
        Self {
            state: RwLock::new(BuildState {
                tree,
                dirs: HashMap::new(),
                awaiting,
                early: HashMap::new(),
            }),
        }
    }

    /// Insert one listing
    pub fn insert(&self, listing: DirectoryListing) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| SyncError::Runtime("index lock poisoned".to_string()))?;
        debug!(path = %listing.path, entries = listing.entries.len(), "directory listed");
        state.insert(listing);
        Ok(())
    }

    /// Consume listings until every sender is dropped
    pub fn build_from_stream(&self, listings: Receiver<DirectoryListing>) -> Result<()> {
        for listing in listings.iter() {
            self.insert(listing)?;
        }
        Ok(())
    }

    /// Number of directories listed so far
    pub fn directory_count(&self) -> usize {
        self.state.read().map(|s| s.dirs.len()).unwrap_or(0)
    }

    pub fn contains_directory(&self, path: &str) -> bool {
        self.state
            .read()
            .map(|s| s.dirs.contains_key(path))
            .unwrap_or(false)
    }

    /// Freeze the snapshot
    ///
    /// Directories that never received a listing (unreadable during the walk)
    /// are marked as not recorded.
    pub fn finish(self) -> Result<Index> {
        let mut state = self
            .state
            .into_inner()
            .map_err(|_| SyncError::Runtime("index lock poisoned".to_string()))?;

        for (path, id) in state.awaiting.drain() {
            debug!(path = %path, "directory never listed");
            state.tree.node_mut(id).children = None;
        }
        for path in state.early.keys() {
            warn!(path = %path, "listing for a directory outside the snapshot dropped");
        }

        Ok(Index {
            tree: state.tree,
            dirs: state.dirs,
        })
    }
}
