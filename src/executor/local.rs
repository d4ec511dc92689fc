//! Local side writes: atomic file restore and entry removal

use crate::remote::{Backend, RemoteFile};
use crate::types::{Result, SyncError};
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Fetch `file` from the backend into `dest` atomically
///
/// 1. Stream the object into a `.part` file next to `dest`
/// 2. Flush and sync to disk
/// 3. Apply the recorded permissions and modification time
/// 4. Rename onto `dest`
///
/// Returns the number of bytes written.
pub fn restore_file_atomic(backend: &dyn Backend, file: &RemoteFile, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::entry(parent, e))?;
    }

    let staging = part_path(dest);
    let written = {
        let part = File::create(&staging).map_err(|e| SyncError::entry(&staging, e))?;
        let mut writer = BufWriter::new(part);
        let result = backend.read_file(file, &mut writer).and_then(|written| {
            writer.flush().map_err(|e| SyncError::entry(&staging, e))?;
            writer
                .get_ref()
                .sync_all()
                .map_err(|e| SyncError::entry(&staging, e))?;
            Ok(written)
        });
        match result {
            Ok(written) => written,
            Err(e) => {
                drop(writer);
                let _ = fs::remove_file(&staging);
                return Err(e);
            }
        }
    };

    set_permissions(&staging, file.node.mode.permissions)?;
    filetime::set_file_mtime(&staging, file_time(file.node.modified_at))
        .map_err(|e| SyncError::entry(&staging, e))?;

    // anything of another kind in the way goes first
    if let Ok(existing) = fs::symlink_metadata(dest) {
        if existing.is_dir() {
            remove_path_any(dest)?;
        }
    }
    fs::rename(&staging, dest).map_err(|e| SyncError::entry(dest, e))?;
    Ok(written)
}

/// Sibling of `dest` that holds the download until it is complete
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(OsString::new);
    name.push(".part");
    dest.with_file_name(name)
}

/// Create `dest` as a directory, replacing a non-directory in the way
pub fn create_dir(dest: &Path) -> Result<()> {
    if let Ok(existing) = fs::symlink_metadata(dest) {
        if existing.is_dir() {
            return Ok(());
        }
        remove_path_any(dest)?;
    }
    fs::create_dir_all(dest).map_err(|e| SyncError::entry(dest, e))
}

/// Remove any filesystem entry at `path`; a missing entry is not an error
///
/// Directories are removed recursively; files and symlinks are removed as files.
pub fn remove_path_any(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(SyncError::entry(path, e)),
    };
    let result = if metadata.file_type().is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| SyncError::entry(path, e))
}

/// Set a directory's modification time after its contents were written
pub fn restore_mtime(path: &Path, modified_at: i64) -> Result<()> {
    filetime::set_file_mtime(path, file_time(modified_at)).map_err(|e| SyncError::entry(path, e))
}

fn file_time(nanos: i64) -> FileTime {
    let secs = nanos.div_euclid(1_000_000_000);
    let subsec = nanos.rem_euclid(1_000_000_000) as u32;
    FileTime::from_unix_time(secs, subsec)
}

#[cfg(unix)]
fn set_permissions(path: &Path, permissions: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(permissions))
        .map_err(|e| SyncError::entry(path, e))
}

#[cfg(not(unix))]
fn set_permissions(path: &Path, permissions: u32) -> Result<()> {
    let mut perms = fs::metadata(path)
        .map_err(|e| SyncError::entry(path, e))?
        .permissions();
    perms.set_readonly(permissions & 0o222 == 0);
    fs::set_permissions(path, perms).map_err(|e| SyncError::entry(path, e))
}
