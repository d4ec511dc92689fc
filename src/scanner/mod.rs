//! Filesystem exploration: walking, ignore rules, stat

mod explorer;
mod ignore;
mod stat;

pub use explorer::{Explorer, ProgressCallback, WalkError, WalkReport};
pub use ignore::{parse_marker, IgnoreRules, IgnoreSet, DEFAULT_MARKER};
pub use stat::{system_time_nanos, OsStat, Stat, StatProvider};
