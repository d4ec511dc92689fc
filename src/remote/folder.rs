//! FolderBackend - remote objects stored in a local directory
//!
//! Objects live under `objects/` at their hashed path; the remote snapshot
//! is `index.json` at the backend root. Writes go through a `.part` file and
//! a rename so a reader never sees half an object.

use super::{Backend, RemoteFile};
use crate::index::Index;
use crate::types::{Result, SyncError};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const OBJECTS_DIR: &str = "objects";
const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone)]
pub struct FolderBackend {
    root: PathBuf,
}

impl FolderBackend {
    /// Open (creating if needed) a backend rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let objects = root.join(OBJECTS_DIR);
        fs::create_dir_all(&objects).map_err(|e| SyncError::entry(&objects, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// Host location of an object
    pub fn object_path(&self, file: &RemoteFile) -> PathBuf {
        let mut host = self.root.join(OBJECTS_DIR);
        for component in file.hashed_path.split('/').filter(|c| !c.is_empty()) {
            host.push(component);
        }
        host
    }

    fn write_object(&self, target: &Path, content: &mut dyn Read) -> Result<u64> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::entry(parent, e))?;
        }
        let part = target.with_extension("part");
        let written = (|| -> io::Result<u64> {
            let mut out = BufWriter::new(File::create(&part)?);
            let written = io::copy(content, &mut out)?;
            out.flush()?;
            out.get_ref().sync_all()?;
            Ok(written)
        })()
        .map_err(|e| {
            let _ = fs::remove_file(&part);
            SyncError::entry(&part, e)
        })?;
        fs::rename(&part, target).map_err(|e| SyncError::entry(target, e))?;
        Ok(written)
    }
}

impl Backend for FolderBackend {
    fn create_file(&self, file: &RemoteFile, content: &mut dyn Read) -> Result<u64> {
        let target = self.object_path(file);
        debug!(path = %file.node.path, object = %target.display(), "creating object");
        self.write_object(&target, content)
    }

    fn read_file(&self, file: &RemoteFile, sink: &mut dyn Write) -> Result<u64> {
        let source = self.object_path(file);
        let mut input = File::open(&source).map_err(|e| SyncError::entry(&source, e))?;
        io::copy(&mut input, sink).map_err(|e| SyncError::entry(&source, e))
    }

    fn update_file(&self, file: &RemoteFile, content: &mut dyn Read) -> Result<u64> {
        let target = self.object_path(file);
        if !target.is_file() {
            return Err(SyncError::Backend(format!(
                "cannot update {}: no object at {}",
                file.node.path,
                target.display()
            )));
        }
        self.write_object(&target, content)
    }

    fn delete_file(&self, file: &RemoteFile) -> Result<()> {
        let target = self.object_path(file);
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::entry(target, e)),
        }
    }

    fn create_dir(&self, dir: &RemoteFile) -> Result<()> {
        let target = self.object_path(dir);
        fs::create_dir_all(&target).map_err(|e| SyncError::entry(target, e))
    }

    fn delete_dir(&self, dir: &RemoteFile) -> Result<()> {
        let target = self.object_path(dir);
        if target == self.root.join(OBJECTS_DIR) {
            return Err(SyncError::Backend("refusing to delete the remote root".to_string()));
        }
        match fs::remove_dir_all(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::entry(target, e)),
        }
    }

    fn load_index(&self) -> Result<Option<Index>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(None);
        }
        Index::load_from_file(&path).map(Some)
    }

    fn store_index(&self, index: &Index) -> Result<()> {
        let target = self.index_path();
        let part = target.with_extension("json.part");
        index.store_to_file(&part)?;
        fs::rename(&part, &target).map_err(|e| SyncError::entry(target, e))
    }
}
