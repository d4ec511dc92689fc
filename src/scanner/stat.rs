//! Stat provider - identity fields of one filesystem entry

use crate::types::{FileKind, FileMode, FileNode};
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata the snapshot records for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub created_at: i64,
    pub modified_at: i64,
    pub mode: FileMode,
    pub inode: u64,
    pub size: u64,
}

impl Stat {
    /// Build a node at virtual `path` carrying these fields
    ///
    /// Directories start with an empty child list and a zero size; both are
    /// filled in when the directory is listed.
    pub fn into_node(self, path: impl Into<String>) -> FileNode {
        let mut node = FileNode::new(path, self.mode);
        node.created_at = self.created_at;
        node.modified_at = self.modified_at;
        node.inode = self.inode;
        node.size = if self.mode.is_dir() { 0 } else { self.size };
        node
    }
}

/// Platform stat call
///
/// Symbolic links are described, never followed.
pub trait StatProvider: Send + Sync {
    fn stat(&self, path: &Path) -> io::Result<Stat>;
}

/// Stat provider backed by the host filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct OsStat;

impl StatProvider for OsStat {
    fn stat(&self, path: &Path) -> io::Result<Stat> {
        let metadata = fs::symlink_metadata(path)?;
        Ok(from_metadata(&metadata))
    }
}

fn kind_of(metadata: &Metadata) -> FileKind {
    let file_type = metadata.file_type();
    if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_file() {
        FileKind::Regular
    } else if file_type.is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::Other
    }
}

#[cfg(unix)]
fn from_metadata(metadata: &Metadata) -> Stat {
    use std::os::unix::fs::MetadataExt;

    let modified_at = metadata
        .mtime()
        .saturating_mul(1_000_000_000)
        .saturating_add(metadata.mtime_nsec());
    let changed_at = metadata
        .ctime()
        .saturating_mul(1_000_000_000)
        .saturating_add(metadata.ctime_nsec());
    // birth time where the filesystem records it
    let created_at = metadata
        .created()
        .map(system_time_nanos)
        .unwrap_or(changed_at);

    Stat {
        created_at,
        modified_at,
        mode: FileMode::new(kind_of(metadata), metadata.mode()),
        inode: metadata.ino(),
        size: metadata.size(),
    }
}

#[cfg(not(unix))]
fn from_metadata(metadata: &Metadata) -> Stat {
    let kind = kind_of(metadata);
    let modified_at = metadata.modified().map(system_time_nanos).unwrap_or(0);
    let created_at = metadata
        .created()
        .map(system_time_nanos)
        .unwrap_or(modified_at);
    let permissions = match (kind, metadata.permissions().readonly()) {
        (FileKind::Directory, _) => 0o755,
        (_, true) => 0o444,
        (_, false) => 0o644,
    };

    Stat {
        created_at,
        modified_at,
        mode: FileMode::new(kind, permissions),
        // no stable inode here
        inode: 0,
        size: metadata.len(),
    }
}

/// Unix nanoseconds of `time`, negative before the epoch
pub fn system_time_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => i64::try_from(e.duration().as_nanos())
            .map(|n| -n)
            .unwrap_or(i64::MIN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    #[test]
    fn test_stat_regular_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();
        filetime::set_file_mtime(&file, FileTime::from_unix_time(1_600_000_000, 500)).unwrap();

        let stat = OsStat.stat(&file).unwrap();
        assert_eq!(stat.size, 5);
        assert_eq!(stat.mode.kind, FileKind::Regular);
        assert_eq!(stat.modified_at, 1_600_000_000_000_000_500);
    }

    #[test]
    fn test_stat_directory_node_has_no_size_yet() {
        let temp = TempDir::new().unwrap();
        let stat = OsStat.stat(temp.path()).unwrap();
        assert!(stat.mode.is_dir());

        let node = stat.into_node("/");
        assert_eq!(node.size, 0);
        assert_eq!(node.children.as_deref(), Some(&[][..]));
    }

    #[cfg(unix)]
    #[test]
    fn test_stat_does_not_follow_symlinks() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        fs::create_dir(&target).unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let stat = OsStat.stat(&link).unwrap();
        assert_eq!(stat.mode.kind, FileKind::Symlink);
        assert!(stat.into_node("/link").children.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_stat_records_inode_and_permissions() {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let temp = TempDir::new().unwrap();
        let file = temp.path().join("x");
        fs::write(&file, b"").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).unwrap();

        let stat = OsStat.stat(&file).unwrap();
        assert_eq!(stat.inode, fs::metadata(&file).unwrap().ino());
        assert_eq!(stat.mode.permissions, 0o640);
    }

    #[test]
    fn test_system_time_nanos_before_epoch() {
        let before = UNIX_EPOCH - std::time::Duration::from_nanos(5);
        assert_eq!(system_time_nanos(before), -5);
    }
}
