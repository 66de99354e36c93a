//! Reconciliation planning and execution.
//!
//! The planner compares live observations with tracked state and produces
//! one action per catalog resource; the executor carries those actions out
//! through the declarative engine.

mod diff;
mod executor;
mod plan;

pub use diff::Planner;
pub use executor::{ActionExecutor, ActionResult, ExecutionOutcome};
pub use plan::{ConflictReason, PlannedEntry, ReconciliationAction, ReconciliationPlan};
