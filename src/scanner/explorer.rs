//! Explorer - concurrent walk of the sync root into an index
//!
//! Workers share a bounded job channel of pending directories. A worker
//! never blocks while handing out work: when the channel is full the
//! subdirectory goes onto the worker's own stack instead. An outstanding-job
//! counter is incremented for every subdirectory before its parent's job is
//! retired; whoever brings it to zero tells all workers to stop.
//!
//! Finished listings flow to a builder thread, per-entry failures to a
//! logger thread. Neither aborts the walk.

use super::ignore::IgnoreRules;
use super::stat::{OsStat, StatProvider};
use crate::index::{DirectoryListing, Index, IndexBuilder};
use crate::types::{path, Result, SyncError, SyncState};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Callback for scan progress: (entries recorded, bytes recorded)
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// One entry or directory the walk had to skip
#[derive(Debug, Error)]
#[error("{}: {source}", path.display())]
pub struct WalkError {
    pub path: PathBuf,
    /// Snapshot path of the skipped entry
    pub entry: String,
    #[source]
    pub source: io::Error,
}

/// Summary of one walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Directories listed
    pub directories: u64,
    /// Non-directory entries recorded as included
    pub files: u64,
    /// Entries recorded as ignored
    pub ignored: u64,
    /// Entries or directories skipped because of an error
    pub skipped: u64,
    /// Snapshot paths of the skipped entries, sorted
    ///
    /// A skipped directory that still appears in the snapshot has no
    /// recorded children.
    pub skipped_paths: Vec<String>,
    pub duration: Duration,
}

impl WalkReport {
    /// True if some subtree may be missing from the snapshot
    pub fn is_incomplete(&self) -> bool {
        self.skipped > 0
    }
}

#[derive(Debug)]
struct DirJob {
    host: PathBuf,
    path: String,
}

#[derive(Debug)]
enum Job {
    Dir(DirJob),
    Stop,
}

/// Walks a root directory once and produces its snapshot
pub struct Explorer<S = OsStat> {
    root: PathBuf,
    rules: IgnoreRules,
    workers: usize,
    stat: S,
}

impl Explorer<OsStat> {
    pub fn new(root: impl Into<PathBuf>, rules: IgnoreRules) -> Self {
        Self {
            root: root.into(),
            rules,
            workers: 4,
            stat: OsStat,
        }
    }
}

impl<S: StatProvider> Explorer<S> {
    /// Number of worker threads (at least one)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Replace the stat provider
    pub fn with_stat<T: StatProvider>(self, stat: T) -> Explorer<T> {
        Explorer {
            root: self.root,
            rules: self.rules,
            workers: self.workers,
            stat,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn explore(&self) -> Result<(Index, WalkReport)> {
        self.explore_with_progress(None)
    }

    /// Walk the root and build its index
    ///
    /// Fails only if the root itself cannot be opened. Unreadable entries
    /// below it are logged, counted in `skipped`, and left out.
    pub fn explore_with_progress(
        &self,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<(Index, WalkReport)> {
        let started = Instant::now();

        let root_stat = self
            .stat
            .stat(&self.root)
            .map_err(|source| SyncError::RootUnavailable {
                path: self.root.clone(),
                source,
            })?;
        if !root_stat.mode.is_dir() {
            return Err(SyncError::RootUnavailable {
                path: self.root.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            });
        }
        fs::read_dir(&self.root).map_err(|source| SyncError::RootUnavailable {
            path: self.root.clone(),
            source,
        })?;

        info!(root = %self.root.display(), workers = self.workers, "exploring");

        let builder = IndexBuilder::new(root_stat.into_node(path::ROOT));
        let ctx = WalkContext {
            rules: &self.rules,
            stat: &self.stat,
            workers: self.workers,
            outstanding: AtomicUsize::new(1),
            directories: AtomicU64::new(0),
            files: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            on_progress,
        };

        let (job_tx, job_rx) = bounded::<Job>(self.workers * 4);
        let (listing_tx, listing_rx) = unbounded::<DirectoryListing>();
        let (error_tx, error_rx) = unbounded::<WalkError>();

        job_tx
            .send(Job::Dir(DirJob {
                host: self.root.clone(),
                path: path::ROOT.to_string(),
            }))
            .map_err(|_| SyncError::Runtime("job channel closed".to_string()))?;

        let skipped_paths = thread::scope(|s| -> Result<Vec<String>> {
            let build = s.spawn(|| builder.build_from_stream(listing_rx));
            let logger = s.spawn(move || log_errors(error_rx));

            let handles: Vec<_> = (0..self.workers)
                .map(|_| {
                    let mut worker = Worker {
                        ctx: &ctx,
                        jobs_tx: job_tx.clone(),
                        jobs_rx: job_rx.clone(),
                        listings: listing_tx.clone(),
                        errors: error_tx.clone(),
                        local: Vec::new(),
                    };
                    s.spawn(move || worker.run())
                })
                .collect();

            // workers hold the only remaining senders
            drop(listing_tx);
            drop(error_tx);

            for handle in handles {
                handle
                    .join()
                    .map_err(|_| SyncError::Runtime("explorer worker panicked".to_string()))?;
            }
            build
                .join()
                .map_err(|_| SyncError::Runtime("index builder panicked".to_string()))??;
            logger
                .join()
                .map_err(|_| SyncError::Runtime("error logger panicked".to_string()))
        })?;

        let index = builder.finish()?;
        if index.get_directory(path::ROOT).is_err() {
            return Err(SyncError::RootUnavailable {
                path: self.root.clone(),
                source: io::Error::new(io::ErrorKind::Other, "root could not be listed"),
            });
        }

        let report = WalkReport {
            directories: ctx.directories.load(Ordering::Relaxed),
            files: ctx.files.load(Ordering::Relaxed),
            ignored: ctx.ignored.load(Ordering::Relaxed),
            skipped: skipped_paths.len() as u64,
            skipped_paths,
            duration: started.elapsed(),
        };
        info!(
            directories = report.directories,
            files = report.files,
            ignored = report.ignored,
            skipped = report.skipped,
            elapsed_ms = report.duration.as_millis() as u64,
            "exploration finished"
        );
        Ok((index, report))
    }
}

/// State shared by all workers of one walk
struct WalkContext<'a, S> {
    rules: &'a IgnoreRules,
    stat: &'a S,
    workers: usize,
    outstanding: AtomicUsize,
    directories: AtomicU64,
    files: AtomicU64,
    ignored: AtomicU64,
    bytes: AtomicU64,
    on_progress: Option<&'a ProgressCallback>,
}

struct Worker<'a, S> {
    ctx: &'a WalkContext<'a, S>,
    jobs_tx: Sender<Job>,
    jobs_rx: Receiver<Job>,
    listings: Sender<DirectoryListing>,
    errors: Sender<WalkError>,
    /// Overflow for subdirectories the shared channel had no room for
    local: Vec<DirJob>,
}

impl<S: StatProvider> Worker<'_, S> {
    fn run(&mut self) {
        loop {
            let job = match self.local.pop() {
                Some(job) => job,
                None => match self.jobs_rx.recv() {
                    Ok(Job::Dir(job)) => job,
                    Ok(Job::Stop) | Err(_) => return,
                },
            };

            self.explore_directory(job);

            if self.ctx.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
                debug!("last directory retired, stopping workers");
                for _ in 0..self.ctx.workers {
                    // capacity covers one stop per worker
                    let _ = self.jobs_tx.send(Job::Stop);
                }
            }
        }
    }

    fn report(&self, path: PathBuf, entry: String, source: io::Error) {
        // the logger outlives every worker
        let _ = self.errors.send(WalkError {
            path,
            entry,
            source,
        });
    }

    fn enqueue(&mut self, job: DirJob) {
        self.ctx.outstanding.fetch_add(1, Ordering::AcqRel);
        match self.jobs_tx.try_send(Job::Dir(job)) {
            Ok(()) => {}
            Err(TrySendError::Full(Job::Dir(job)))
            | Err(TrySendError::Disconnected(Job::Dir(job))) => self.local.push(job),
            Err(_) => {}
        }
    }

    fn explore_directory(&mut self, job: DirJob) {
        // an unreadable directory stays in the snapshot without children
        let (names, unnamed) = match read_names(&job.host) {
            Ok(listed) => listed,
            Err(e) => {
                self.report(job.host, job.path, e);
                return;
            }
        };
        for raw in unnamed {
            let entry = path::join(&job.path, &raw.to_string_lossy());
            self.report(
                job.host.join(&raw),
                entry,
                io::Error::new(io::ErrorKind::InvalidData, "entry name is not valid UTF-8"),
            );
        }

        let ignore = match self.ctx.rules.for_directory(&job.host, &names) {
            Ok(ignore) => ignore,
            Err(e) => {
                // Without the marker we cannot tell what is private here, so
                // the directory is left unlisted on purpose and its subtree
                // is treated as unknown when comparing.
                self.report(job.host.join(self.ctx.rules.marker()), job.path, e);
                return;
            }
        };

        let mut entries = Vec::with_capacity(names.len());
        let mut subdirs = Vec::new();
        for name in names {
            let host = job.host.join(&name);
            let stat = match self.ctx.stat.stat(&host) {
                Ok(stat) => stat,
                Err(e) => {
                    self.report(host, path::join(&job.path, &name), e);
                    continue;
                }
            };

            let mut node = stat.into_node(path::join(&job.path, &name));
            if ignore.is_ignored(&name) {
                node.state = SyncState::Ignored;
                if node.is_dir() {
                    node.children = None;
                }
                self.ctx.ignored.fetch_add(1, Ordering::Relaxed);
            } else if node.is_dir() {
                subdirs.push(DirJob {
                    host,
                    path: node.path.clone(),
                });
            } else {
                self.ctx.files.fetch_add(1, Ordering::Relaxed);
                let bytes = self.ctx.bytes.fetch_add(node.size, Ordering::Relaxed) + node.size;
                if let Some(callback) = self.ctx.on_progress {
                    callback(self.ctx.files.load(Ordering::Relaxed), bytes);
                }
            }
            entries.push(node);
        }

        self.ctx.directories.fetch_add(1, Ordering::Relaxed);
        // the listing is published before any subdirectory can be listed
        let _ = self.listings.send(DirectoryListing {
            path: job.path,
            entries,
        });
        for subdir in subdirs {
            self.enqueue(subdir);
        }
    }
}

/// Names of the entries of `dir`, and the raw names that are not UTF-8
///
/// A failure to read the directory itself abandons the listing.
fn read_names(dir: &Path) -> io::Result<(Vec<String>, Vec<OsString>)> {
    let mut names = Vec::new();
    let mut unnamed = Vec::new();
    for entry in fs::read_dir(dir)? {
        match entry?.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => unnamed.push(raw),
        }
    }
    Ok((names, unnamed))
}

/// Drain walk errors, returning the sorted snapshot paths they name
fn log_errors(errors: Receiver<WalkError>) -> Vec<String> {
    let mut skipped = Vec::new();
    for err in errors.iter() {
        warn!(path = %err.path.display(), error = %err.source, "skipped during exploration");
        skipped.push(err.entry);
    }
    skipped.sort();
    skipped
}
