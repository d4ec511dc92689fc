//! Comparator - reconciliation rules, concurrent engine and plan

mod compare;
mod engine;
mod plan;

pub use engine::{Comparator, RunSummary};
pub use plan::{PlanStats, SyncPlan};
