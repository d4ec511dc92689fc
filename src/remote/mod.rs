//! Remote side: object descriptors, path hashing and storage backends

mod folder;

pub use folder::FolderBackend;

use crate::index::Index;
use crate::types::{path, FileNode, Result};
use std::io::{Read, Write};

/// Context string for deriving the path hashing key
const KEY_CONTEXT: &str = "homesync path hashing v1";

/// Keyed hash of path components
///
/// Each component is hashed on its own, so the hashed path of a child always
/// extends the hashed path of its directory.
#[derive(Clone)]
pub struct PathHasher {
    key: [u8; 32],
}

impl PathHasher {
    pub fn new(secret: &str) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
        }
    }

    /// Hex digest of one name
    pub fn hash_name(&self, name: &str) -> String {
        blake3::keyed_hash(&self.key, name.as_bytes())
            .to_hex()
            .to_string()
    }

    /// Hash every component of a virtual path; the root stays `/`
    pub fn hash_path(&self, virtual_path: &str) -> String {
        let mut out = String::new();
        for component in virtual_path.split('/').filter(|c| !c.is_empty()) {
            out.push('/');
            out.push_str(&self.hash_name(component));
        }
        if out.is_empty() {
            out.push_str(path::ROOT);
        }
        out
    }
}

impl std::fmt::Debug for PathHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PathHasher { .. }")
    }
}

/// Descriptor of one remote object
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub hashed_path: String,
    pub hashed_name: String,
    /// Metadata of the corresponding snapshot node, without children
    pub node: FileNode,
}

impl RemoteFile {
    pub fn new(hasher: &PathHasher, node: &FileNode) -> Self {
        let mut node = node.clone();
        node.children = None;
        let hashed_name = if node.path == path::ROOT {
            path::ROOT.to_string()
        } else {
            hasher.hash_name(node.base())
        };
        Self {
            hashed_path: hasher.hash_path(&node.path),
            hashed_name,
            node,
        }
    }
}

/// Storage for remote objects and the remote snapshot
///
/// Implementations own retry and transport concerns.
pub trait Backend: Send + Sync {
    /// Store a new object, replacing any stale object at the same location
    fn create_file(&self, file: &RemoteFile, content: &mut dyn Read) -> Result<u64>;

    /// Copy an object's content into `sink`
    fn read_file(&self, file: &RemoteFile, sink: &mut dyn Write) -> Result<u64>;

    /// Replace the content of an existing object
    fn update_file(&self, file: &RemoteFile, content: &mut dyn Read) -> Result<u64>;

    /// Remove an object; removing a missing object succeeds
    fn delete_file(&self, file: &RemoteFile) -> Result<()>;

    fn create_dir(&self, dir: &RemoteFile) -> Result<()>;

    /// Remove a directory and everything below it
    fn delete_dir(&self, dir: &RemoteFile) -> Result<()>;

    /// The stored snapshot, or `None` if the remote was never seeded
    fn load_index(&self) -> Result<Option<Index>>;

    fn store_index(&self, index: &Index) -> Result<()>;
}
