//! Command line interface

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "homesync")]
#[command(version)]
#[command(about = "Snapshot, compare and converge a home directory with a remote copy")]
pub struct Cli {
    /// TOML config file; command line values override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Local sync root
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Directory holding the remote copy
    #[arg(long, global = true)]
    pub remote: Option<PathBuf>,

    /// Extra directory or file name to skip everywhere (repeatable)
    #[arg(long = "ignore", value_name = "NAME", global = true)]
    pub ignore: Vec<String>,

    /// Exploration worker threads
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Parallel directory comparisons
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Show the plan without changing anything
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Carry out deletions inferred from directory timestamps
    #[arg(long, global = true)]
    pub allow_deletes: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Walk the local root and summarize it
    Scan {
        /// Store the snapshot as JSON
        #[arg(long, value_name = "FILE")]
        index_out: Option<PathBuf>,

        /// Print the full snapshot tree
        #[arg(long)]
        tree: bool,
    },

    /// Compare the local root with the remote snapshot and print the plan
    Status,

    /// Compare, then transfer and store the converged snapshot
    Sync,
}
