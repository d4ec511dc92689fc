//! Configuration management

mod cli;

pub use cli::{Cli, Command};

use crate::scanner::{IgnoreRules, DEFAULT_MARKER};
use crate::types::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory names skipped everywhere below the root
pub const DEFAULT_IGNORE_NAMES: &[&str] = &[
    "node_modules",
    "proc",
    "boot",
    "dev",
    "sys",
    "lib",
    "media",
    "mnt",
    "bin",
    "sbin",
    "srv",
    "tmp",
    "log",
];

/// Global configuration for homesync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local sync root
    pub root: PathBuf,

    /// Directory holding the folder backend
    pub remote: Option<PathBuf>,

    /// Global ignore tier
    pub ignore_names: Vec<String>,

    /// Per-directory marker file listing names to skip
    pub ignore_file: String,

    /// Exploration worker threads
    pub explore_workers: usize,

    /// Parallel directory comparisons
    pub compare_concurrency: usize,

    /// Key material for hashing remote paths
    pub secret: String,

    /// Dry run (show plan, don't execute)
    pub dry_run: bool,

    /// Act on deletions inferred from directory timestamps
    pub allow_inferred_deletes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            remote: None,
            ignore_names: DEFAULT_IGNORE_NAMES.iter().map(|s| s.to_string()).collect(),
            ignore_file: DEFAULT_MARKER.to_string(),
            explore_workers: 4,
            compare_concurrency: 8,
            secret: String::new(),
            dry_run: false,
            allow_inferred_deletes: false,
        }
    }
}

impl Config {
    /// Load a TOML config file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&text)
            .map_err(|e| SyncError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(SyncError::Config("sync root is not set".to_string()));
        }
        if !self.root.exists() {
            return Err(SyncError::Config(format!(
                "sync root does not exist: {}",
                self.root.display()
            )));
        }
        if !self.root.is_dir() {
            return Err(SyncError::Config(format!(
                "sync root is not a directory: {}",
                self.root.display()
            )));
        }
        if self.explore_workers == 0 || self.compare_concurrency == 0 {
            return Err(SyncError::Config(
                "worker and concurrency limits must be at least 1".to_string(),
            ));
        }
        if self.ignore_file.is_empty() || self.ignore_file.contains('/') {
            return Err(SyncError::Config(format!(
                "ignore file must be a plain file name: {:?}",
                self.ignore_file
            )));
        }

        if let Some(remote) = &self.remote {
            let root = absolute(&self.root);
            let remote = absolute(remote);
            if remote == root {
                return Err(SyncError::Config(
                    "remote and root cannot be the same".to_string(),
                ));
            }
            if remote.starts_with(&root) {
                return Err(SyncError::Config(format!(
                    "remote {} is inside the sync root",
                    remote.display()
                )));
            }
        }

        Ok(())
    }

    /// Remote location, required by commands that talk to the backend
    pub fn require_remote(&self) -> Result<&Path> {
        self.remote
            .as_deref()
            .ok_or_else(|| SyncError::Config("no remote configured (use --remote)".to_string()))
    }

    pub fn ignore_rules(&self) -> IgnoreRules {
        IgnoreRules::new(self.ignore_names.iter().cloned(), self.ignore_file.clone())
    }
}

impl TryFrom<Cli> for Config {
    type Error = SyncError;

    /// Layer command line values over the config file (or the defaults)
    fn try_from(cli: Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(root) = cli.root {
            config.root = root;
        }
        if let Some(remote) = cli.remote {
            config.remote = Some(remote);
        }
        config.ignore_names.extend(cli.ignore);
        if let Some(workers) = cli.workers {
            config.explore_workers = workers;
        }
        if let Some(concurrency) = cli.concurrency {
            config.compare_concurrency = concurrency;
        }
        config.dry_run |= cli.dry_run;
        config.allow_inferred_deletes |= cli.allow_deletes;

        config.validate()?;
        Ok(config)
    }
}

/// Canonical form when the path exists, the path as given otherwise
fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
