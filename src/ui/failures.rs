//! Plain-language summary of the tasks that failed during one run

use crate::types::SyncError;
use std::collections::BTreeMap;
use std::io::ErrorKind;

/// At most this many failures are spelled out per category
const SHOWN_PER_CATEGORY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureCategory {
    LocalAccess,
    Remote,
    Snapshot,
    Other,
}

impl FailureCategory {
    fn of(error: &SyncError) -> Self {
        match error {
            SyncError::Io(_) | SyncError::Entry { .. } | SyncError::RootUnavailable { .. } => {
                FailureCategory::LocalAccess
            }
            SyncError::Backend(_) => FailureCategory::Remote,
            SyncError::NotFound { .. }
            | SyncError::InvariantViolation { .. }
            | SyncError::MalformedPath(_)
            | SyncError::CorruptIndex(_) => FailureCategory::Snapshot,
            SyncError::Config(_) | SyncError::Runtime(_) | SyncError::Incomplete(_) => {
                FailureCategory::Other
            }
        }
    }

    fn title(self) -> &'static str {
        match self {
            FailureCategory::LocalAccess => "Filesystem access",
            FailureCategory::Remote => "Remote storage",
            FailureCategory::Snapshot => "Snapshot out of date",
            FailureCategory::Other => "Other",
        }
    }
}

/// One failed task
#[derive(Debug, Clone)]
pub struct Failure {
    pub category: FailureCategory,
    pub action: String,
    pub path: String,
    pub message: String,
    pub hint: Option<&'static str>,
}

impl Failure {
    pub fn new(action: &str, path: &str, error: &SyncError) -> Self {
        Self {
            category: FailureCategory::of(error),
            action: action.to_string(),
            path: path.to_string(),
            message: describe(error),
            hint: hint(error),
        }
    }
}

fn describe(error: &SyncError) -> String {
    match error {
        SyncError::Entry { path, source } => match source.kind() {
            ErrorKind::NotFound => format!("{} disappeared", path.display()),
            ErrorKind::PermissionDenied => format!("no permission to access {}", path.display()),
            _ => format!("{}: {}", path.display(), source),
        },
        SyncError::NotFound { path } => format!("{} is not in the snapshot", path),
        other => other.to_string(),
    }
}

fn hint(error: &SyncError) -> Option<&'static str> {
    let io_kind = match error {
        SyncError::Io(e) => Some(e.kind()),
        SyncError::Entry { source, .. } => Some(source.kind()),
        _ => None,
    };
    match (error, io_kind) {
        (_, Some(ErrorKind::NotFound)) | (SyncError::NotFound { .. }, _) => {
            Some("the tree changed while syncing; run sync again")
        }
        (_, Some(ErrorKind::PermissionDenied)) => {
            Some("fix the permissions or list the entry in an ignore file")
        }
        (SyncError::Backend(_), _) => Some("check that the remote directory is mounted and writable"),
        _ => None,
    }
}

/// Failures collected while a plan executes
#[derive(Debug, Default)]
pub struct FailureLog {
    failures: Vec<Failure>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action: &str, path: &str, error: &SyncError) {
        self.failures.push(Failure::new(action, path, error));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Failures grouped by category, a few examples each
    pub fn render(&self) -> String {
        let mut by_category: BTreeMap<FailureCategory, Vec<&Failure>> = BTreeMap::new();
        for failure in &self.failures {
            by_category.entry(failure.category).or_default().push(failure);
        }

        let mut out = format!("{} task(s) failed:", self.failures.len());
        for (category, failures) in by_category {
            out.push_str(&format!("\n  {} ({})", category.title(), failures.len()));
            for failure in failures.iter().take(SHOWN_PER_CATEGORY) {
                out.push_str(&format!(
                    "\n    {} {}: {}",
                    failure.action, failure.path, failure.message
                ));
                if let Some(hint) = failure.hint {
                    out.push_str(&format!("\n      hint: {}", hint));
                }
            }
            if failures.len() > SHOWN_PER_CATEGORY {
                out.push_str(&format!(
                    "\n    and {} more",
                    failures.len() - SHOWN_PER_CATEGORY
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn denied(path: &str) -> SyncError {
        SyncError::entry(path, io::Error::new(ErrorKind::PermissionDenied, "denied"))
    }

    #[test]
    fn test_categories() {
        assert_eq!(FailureCategory::of(&denied("/x")), FailureCategory::LocalAccess);
        assert_eq!(
            FailureCategory::of(&SyncError::Backend("gone".to_string())),
            FailureCategory::Remote
        );
        assert_eq!(
            FailureCategory::of(&SyncError::not_found("/a")),
            FailureCategory::Snapshot
        );
    }

    #[test]
    fn test_render_groups_and_hints() {
        let mut log = FailureLog::new();
        log.record("upload", "/a.txt", &denied("/home/me/a.txt"));
        log.record("download", "/b.txt", &SyncError::Backend("no object".to_string()));
        log.record("upload", "/c.txt", &SyncError::not_found("/c.txt"));
        assert_eq!(log.len(), 3);

        let text = log.render();
        assert!(text.starts_with("3 task(s) failed:"));
        assert!(text.contains("Filesystem access (1)"));
        assert!(text.contains("upload /a.txt: no permission to access /home/me/a.txt"));
        assert!(text.contains("hint: fix the permissions"));
        assert!(text.contains("Remote storage (1)"));
        assert!(text.contains("/c.txt is not in the snapshot"));
        assert!(text.contains("run sync again"));
    }

    #[test]
    fn test_render_truncates_long_categories() {
        let mut log = FailureLog::new();
        for i in 0..5 {
            log.record("upload", &format!("/f{}", i), &denied("/x"));
        }
        let text = log.render();
        assert!(text.contains("/f2"));
        assert!(!text.contains("/f3"));
        assert!(text.contains("and 2 more"));
    }
}
