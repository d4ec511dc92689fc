//! Slash-separated snapshot paths
//!
//! Every node in a snapshot is addressed by a virtual path relative to the
//! sync root: it always starts with `/`, the root itself is `"/"`, and no
//! other path ends with a slash. Host paths are converted at the edges.

use super::SyncError;
use std::path::{Component, Path, PathBuf};

/// Virtual path of the snapshot root.
pub const ROOT: &str = "/";

/// Last component of a virtual path. The root is its own base.
///
/// # Panics
/// Panics on an empty path.
pub fn base(path: &str) -> &str {
    assert!(!path.is_empty(), "empty snapshot path");
    if path == ROOT {
        return ROOT;
    }
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Parent directory of a virtual path. The root is its own parent.
///
/// # Panics
/// Panics on an empty path.
pub fn dirname(path: &str) -> &str {
    assert!(!path.is_empty(), "empty snapshot path");
    match path.rfind('/') {
        Some(0) | None => ROOT,
        Some(i) => &path[..i],
    }
}

/// Join a child name onto a directory path.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Check that `path` is a well-formed virtual path.
pub fn validate(path: &str) -> Result<(), SyncError> {
    if path.is_empty() {
        return Err(SyncError::MalformedPath("empty path".to_string()));
    }
    if !path.starts_with('/') {
        return Err(SyncError::MalformedPath(format!(
            "'{}' does not start with '/'",
            path
        )));
    }
    if path != ROOT && path.ends_with('/') {
        return Err(SyncError::MalformedPath(format!(
            "'{}' has a trailing slash",
            path
        )));
    }
    if path != ROOT && path[1..].split('/').any(|c| c.is_empty() || c == "." || c == "..") {
        return Err(SyncError::MalformedPath(format!(
            "'{}' contains an empty or relative component",
            path
        )));
    }
    Ok(())
}

/// Map a host path below `root` to its virtual path.
///
/// Returns `None` when `host` is not inside `root` or a component is not
/// valid UTF-8.
pub fn to_virtual(root: &Path, host: &Path) -> Option<String> {
    let relative = host.strip_prefix(root).ok()?;
    let mut out = String::from(ROOT);
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_str()?;
                if out.len() > 1 {
                    out.push('/');
                }
                out.push_str(name);
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

/// Map a virtual path to a host path below `root`.
pub fn to_host(root: &Path, path: &str) -> PathBuf {
    let mut host = root.to_path_buf();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        host.push(component);
    }
    host
}
