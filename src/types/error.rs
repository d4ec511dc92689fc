//! Error types for homesync

use std::path::PathBuf;
use thiserror::Error;

/// Error types for homesync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Index lookup miss. Absence is sync information, not a failure.
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// Standard IO error (automatically converted via #[from])
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO failure on one entry during a walk or transfer
    #[error("IO error on {path}: {source}")]
    Entry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The two snapshots disagree in a way that cannot happen for one logical tree
    #[error("Invariant violation at {path}: {reason}")]
    InvariantViolation { path: String, reason: String },

    #[error("Malformed path: {0}")]
    MalformedPath(String),

    /// Persisted index could not be decoded or failed validation
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// The sync root cannot be opened at all
    #[error("Root unavailable: {path}: {source}")]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(String),

    /// Thread, runtime or lock failure
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A plan ran to the end but some of its tasks failed
    #[error("{0}")]
    Incomplete(String),
}

impl SyncError {
    pub fn not_found(path: impl Into<String>) -> Self {
        SyncError::NotFound { path: path.into() }
    }

    pub fn invariant(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::InvariantViolation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn entry(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Entry {
            path: path.into(),
            source,
        }
    }

    /// Check if this error is an index lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            SyncError::InvariantViolation { .. } | SyncError::MalformedPath(_)
        )
    }

    /// Check if this error must terminate the whole operation
    ///
    /// Per-entry IO failures are skipped and counted instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::Io(_) | SyncError::Entry { .. })
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_automatic_conversion() {
        let io_error = IoError::new(ErrorKind::NotFound, "file not found");
        let err: SyncError = io_error.into();

        assert!(matches!(err, SyncError::Io(_)));
        assert!(err.to_string().contains("IO error"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_io_error_from_function() {
        fn returns_io_error() -> Result<()> {
            let _file = std::fs::File::open("/nonexistent/path/file.txt")?;
            Ok(())
        }

        let result = returns_io_error();
        assert!(matches!(result.unwrap_err(), SyncError::Io(_)));
    }

    #[test]
    fn test_not_found() {
        let err = SyncError::not_found("/docs/a.txt");
        assert!(err.is_not_found());
        assert!(err.is_fatal());
        assert!(err.to_string().contains("/docs/a.txt"));
    }

    #[test]
    fn test_invariant_violation() {
        let err = SyncError::invariant("/docs", "equal timestamps");
        assert!(err.is_invariant_violation());
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Invariant violation at /docs"));
        assert!(err.to_string().contains("equal timestamps"));

        assert!(SyncError::MalformedPath("x".to_string()).is_invariant_violation());
    }

    #[test]
    fn test_entry_error_is_not_fatal() {
        let err = SyncError::entry(
            "/home/test/locked",
            IoError::new(ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("/home/test/locked"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SyncError::CorruptIndex("bad".to_string()).is_fatal());
        assert!(SyncError::Config("bad".to_string()).is_fatal());
        assert!(SyncError::RootUnavailable {
            path: PathBuf::from("/missing"),
            source: IoError::new(ErrorKind::NotFound, "gone"),
        }
        .is_fatal());
        assert!(!SyncError::Io(IoError::new(ErrorKind::Other, "x")).is_fatal());
    }

    #[test]
    fn test_result_propagation() {
        fn inner_function() -> Result<()> {
            Err(SyncError::Config("test error".to_string()))
        }

        fn outer_function() -> Result<()> {
            inner_function()?;
            Ok(())
        }

        assert!(matches!(outer_function().unwrap_err(), SyncError::Config(_)));
    }
}
