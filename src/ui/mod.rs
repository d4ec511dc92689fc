//! Terminal output

mod failures;
mod progress;

pub use failures::{Failure, FailureCategory, FailureLog};
pub use progress::ProgressReporter;
