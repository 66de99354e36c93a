//! Convergence reporting.
//!
//! Folds execution results into counts plus the list of resources that need
//! an operator, and decides whether the run converged.

use serde::Serialize;

use crate::planner::{ActionResult, ExecutionOutcome};

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No conflicts and no failures.
    Converged,
    /// At least one conflict or failure.
    NeedsAttention,
}

/// A resource that needs an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceIssue {
    /// Logical name.
    pub logical_name: String,
    /// Engine address.
    pub address: String,
    /// What went wrong, verbatim.
    pub reason: String,
}

/// Summary of a reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ConvergenceReport {
    /// Resources the engine now tracks.
    pub applied: usize,
    /// Resources left alone.
    pub skipped: usize,
    /// Creates handed to the engine's apply phase.
    pub deferred: usize,
    /// Entries not attempted because the run was interrupted.
    pub cancelled: usize,
    /// Unresolved conflicts.
    pub conflicts: Vec<ResourceIssue>,
    /// Failed probes or imports.
    pub failures: Vec<ResourceIssue>,
    /// Outcome of the engine apply phase, when it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_apply: Option<ExecutionOutcome>,
    /// Overall status.
    pub status: RunStatus,
    /// Per-resource results.
    pub results: Vec<ActionResult>,
}

impl ConvergenceReport {
    /// Builds a report from execution results.
    #[must_use]
    pub fn from_results(results: Vec<ActionResult>) -> Self {
        let mut report = Self {
            applied: 0,
            skipped: 0,
            deferred: 0,
            cancelled: 0,
            conflicts: Vec::new(),
            failures: Vec::new(),
            engine_apply: None,
            status: RunStatus::Converged,
            results: Vec::new(),
        };

        for result in &results {
            let issue = |reason: &str| ResourceIssue {
                logical_name: result.logical_name.clone(),
                address: result.address.clone(),
                reason: reason.to_string(),
            };
            match &result.outcome {
                ExecutionOutcome::Applied => report.applied += 1,
                ExecutionOutcome::Skipped(_) => report.skipped += 1,
                ExecutionOutcome::Deferred => report.deferred += 1,
                ExecutionOutcome::Conflict(reason) => report.conflicts.push(issue(reason)),
                ExecutionOutcome::Failed(reason) => report.failures.push(issue(reason)),
                ExecutionOutcome::Cancelled => report.cancelled += 1,
            }
        }

        report.results = results;
        report.refresh_status();
        report
    }

    /// Records the outcome of the engine apply phase.
    #[must_use]
    pub fn with_engine_apply(mut self, outcome: ExecutionOutcome) -> Self {
        self.engine_apply = Some(outcome);
        self.refresh_status();
        self
    }

    fn refresh_status(&mut self) {
        let apply_unfinished = matches!(
            self.engine_apply,
            Some(ExecutionOutcome::Failed(_) | ExecutionOutcome::Cancelled)
        );
        self.status = if self.conflicts.is_empty()
            && self.failures.is_empty()
            && self.cancelled == 0
            && !apply_unfinished
        {
            RunStatus::Converged
        } else {
            RunStatus::NeedsAttention
        };
    }

    /// Returns true if the run converged.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.status == RunStatus::Converged
    }

    /// Returns true if the engine's apply phase has work to do.
    #[must_use]
    pub fn needs_engine_apply(&self) -> bool {
        self.deferred > 0
    }

    /// Process exit code for this report: 0 converged, 2 needs attention.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Converged => 0,
            RunStatus::NeedsAttention => 2,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::NeedsAttention => write!(f, "needs attention"),
        }
    }
}

impl std::fmt::Display for ConvergenceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Convergence {}:", self.status)?;
        writeln!(f, "  Applied: {}", self.applied)?;
        writeln!(f, "  Skipped: {}", self.skipped)?;
        writeln!(f, "  Deferred: {}", self.deferred)?;
        if self.cancelled > 0 {
            writeln!(f, "  Cancelled: {}", self.cancelled)?;
        }

        if !self.conflicts.is_empty() {
            writeln!(f, "  Conflicts:")?;
            for c in &self.conflicts {
                writeln!(f, "    - {} ({}): {}", c.logical_name, c.address, c.reason)?;
            }
        }
        if !self.failures.is_empty() {
            writeln!(f, "  Failures:")?;
            for c in &self.failures {
                writeln!(f, "    - {} ({}): {}", c.logical_name, c.address, c.reason)?;
            }
        }
        if let Some(outcome) = &self.engine_apply {
            writeln!(f, "  Engine apply: {outcome}")?;
        }
        Ok(())
    }
}
