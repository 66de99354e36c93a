//! Plan executor.
//!
//! Runs the imports a plan asks for through the declarative engine. Creates
//! are handed to the engine's own apply phase, conflicts are passed through
//! untouched, and one resource failing never stops the rest of the plan.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use crate::engine::DeclarativeEngine;

use super::plan::{PlannedEntry, ReconciliationAction, ReconciliationPlan};

/// What happened to one planned entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The engine now tracks the resource.
    Applied,
    /// Nothing was done.
    Skipped(String),
    /// Left to the engine's apply phase.
    Deferred,
    /// Needs an operator; never executed.
    Conflict(String),
    /// The action failed.
    Failed(String),
    /// Not attempted because the run was interrupted.
    Cancelled,
}

/// Result of executing a single entry.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    /// Logical name.
    pub logical_name: String,
    /// Engine address.
    pub address: String,
    /// The planned action.
    pub action: ReconciliationAction,
    /// What happened.
    pub outcome: ExecutionOutcome,
}

/// Executor for reconciliation plans.
#[derive(Debug)]
pub struct ActionExecutor<'a, E: DeclarativeEngine> {
    engine: &'a E,
    dry_run: bool,
    cancelled: Arc<AtomicBool>,
}

impl<'a, E: DeclarativeEngine> ActionExecutor<'a, E> {
    /// Creates a new executor.
    #[must_use]
    pub fn new(engine: &'a E) -> Self {
        Self {
            engine,
            dry_run: false,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reports imports as skipped instead of running them.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Shares a cancellation flag, checked between entries.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Executes every entry of a plan in order.
    pub async fn execute_plan(&self, plan: &ReconciliationPlan) -> Vec<ActionResult> {
        info!(
            "Executing plan: {} imports, {} creates deferred",
            plan.import_count(),
            plan.create_count()
        );

        let mut results = Vec::with_capacity(plan.entries.len());
        for entry in &plan.entries {
            let outcome = if self.is_cancelled() {
                ExecutionOutcome::Cancelled
            } else {
                self.execute(entry).await
            };
            results.push(ActionResult {
                logical_name: entry.logical_name.clone(),
                address: entry.address.clone(),
                action: entry.action.clone(),
                outcome,
            });
        }

        if self.is_cancelled() {
            warn!("Execution cancelled; remaining entries were not attempted");
        }
        results
    }

    /// Executes a single entry.
    pub async fn execute(&self, entry: &PlannedEntry) -> ExecutionOutcome {
        match &entry.action {
            ReconciliationAction::NoOp { .. } => {
                ExecutionOutcome::Skipped(String::from("already tracked"))
            }
            ReconciliationAction::Create { name } => {
                info!("'{name}' is missing; creation deferred to the engine's apply");
                ExecutionOutcome::Deferred
            }
            ReconciliationAction::Conflict { name, reason } => {
                warn!("Conflict on '{name}': {reason}");
                ExecutionOutcome::Conflict(reason.to_string())
            }
            ReconciliationAction::ProbeFailed { name, error } => {
                error!("Could not probe '{name}': {error}");
                ExecutionOutcome::Failed(error.clone())
            }
            ReconciliationAction::Import { name, native_id } => {
                if self.dry_run {
                    info!("[dry run] would import {native_id} into {}", entry.address);
                    return ExecutionOutcome::Skipped(String::from("dry run"));
                }
                match self.engine.import(&entry.address, native_id).await {
                    Ok(()) => {
                        info!("Imported '{name}' ({native_id})");
                        ExecutionOutcome::Applied
                    }
                    Err(e) if e.is_already_managed() => {
                        info!("'{name}' is already tracked by the engine");
                        ExecutionOutcome::Applied
                    }
                    Err(e) => {
                        error!("Failed to import '{name}': {e}");
                        ExecutionOutcome::Failed(e.detail().to_string())
                    }
                }
            }
        }
    }
}

impl ExecutionOutcome {
    /// Short label used in tables.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped(_) => "skipped",
            Self::Deferred => "deferred",
            Self::Conflict(_) => "conflict",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Reason text, if the outcome carries one.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Skipped(s) | Self::Conflict(s) | Self::Failed(s) => Some(s),
            Self::Applied | Self::Deferred | Self::Cancelled => None,
        }
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{} ({detail})", self.label()),
            None => write!(f, "{}", self.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResourceKind;
    use crate::error::EngineError;
    use crate::planner::ConflictReason;
    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Engine {}

        #[async_trait]
        impl DeclarativeEngine for Engine {
            async fn list(&self) -> Result<Vec<String>, EngineError>;
            async fn import(&self, address: &str, native_id: &str) -> Result<(), EngineError>;
            async fn remove(&self, address: &str) -> Result<(), EngineError>;
            async fn apply(&self, auto_approve: bool) -> Result<(), EngineError>;
        }
    }

    fn entry(name: &str, action: ReconciliationAction) -> PlannedEntry {
        PlannedEntry {
            logical_name: name.to_string(),
            address: format!("aws_instance.{name}"),
            kind: ResourceKind::Compute,
            action,
        }
    }

    fn plan(entries: Vec<PlannedEntry>) -> ReconciliationPlan {
        ReconciliationPlan {
            created_at: Utc::now(),
            catalog_hash: String::from("hash"),
            entries,
        }
    }

    fn import(name: &str, id: &str) -> PlannedEntry {
        entry(
            name,
            ReconciliationAction::Import {
                name: name.to_string(),
                native_id: id.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_import_failure_does_not_stop_plan() {
        let mut engine = MockEngine::new();
        engine
            .expect_import()
            .with(eq("aws_instance.a"), eq("i-1"))
            .times(1)
            .returning(|_, _| {
                Err(EngineError::CommandFailed {
                    command: String::from("terraform import"),
                    stderr: String::from("Error: permission denied"),
                })
            });
        engine
            .expect_import()
            .with(eq("aws_instance.b"), eq("i-2"))
            .times(1)
            .returning(|_, _| Ok(()));

        let executor = ActionExecutor::new(&engine);
        let results = executor
            .execute_plan(&plan(vec![import("a", "i-1"), import("b", "i-2")]))
            .await;

        assert_eq!(
            results[0].outcome,
            ExecutionOutcome::Failed(String::from("Error: permission denied"))
        );
        assert_eq!(results[1].outcome, ExecutionOutcome::Applied);
    }

    #[tokio::test]
    async fn test_conflicts_and_creates_never_reach_engine() {
        let mut engine = MockEngine::new();
        engine.expect_import().never();

        let entries = vec![
            entry(
                "vm",
                ReconciliationAction::Conflict {
                    name: String::from("vm"),
                    reason: ConflictReason::Drift {
                        tracked_id: String::from("vm-123"),
                        live_id: String::from("vm-456"),
                    },
                },
            ),
            entry("disk", ReconciliationAction::Create { name: String::from("disk") }),
            entry("net", ReconciliationAction::NoOp { name: String::from("net") }),
        ];

        let results = ActionExecutor::new(&engine).execute_plan(&plan(entries)).await;
        assert_eq!(results[0].outcome.label(), "conflict");
        assert_eq!(results[1].outcome, ExecutionOutcome::Deferred);
        assert_eq!(results[2].outcome.label(), "skipped");
    }

    #[tokio::test]
    async fn test_already_managed_counts_as_applied() {
        let mut engine = MockEngine::new();
        engine.expect_import().returning(|_, _| {
            Err(EngineError::CommandFailed {
                command: String::from("terraform import"),
                stderr: String::from("Error: Resource already managed by Terraform"),
            })
        });

        let outcome = ActionExecutor::new(&engine).execute(&import("a", "i-1")).await;
        assert_eq!(outcome, ExecutionOutcome::Applied);
    }

    #[tokio::test]
    async fn test_dry_run_skips_imports() {
        let mut engine = MockEngine::new();
        engine.expect_import().never();

        let outcome = ActionExecutor::new(&engine)
            .with_dry_run(true)
            .execute(&import("a", "i-1"))
            .await;
        assert_eq!(outcome, ExecutionOutcome::Skipped(String::from("dry run")));
    }

    #[tokio::test]
    async fn test_cancellation_leaves_remaining_unattempted() {
        let mut engine = MockEngine::new();
        engine.expect_import().never();

        let flag = Arc::new(AtomicBool::new(true));
        let results = ActionExecutor::new(&engine)
            .with_cancel_flag(flag)
            .execute_plan(&plan(vec![import("a", "i-1"), import("b", "i-2")]))
            .await;

        assert!(
            results
                .iter()
                .all(|r| r.outcome == ExecutionOutcome::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_probe_failure_is_failed() {
        let engine = MockEngine::new();
        let outcome = ActionExecutor::new(&engine)
            .execute(&entry(
                "x",
                ReconciliationAction::ProbeFailed {
                    name: String::from("x"),
                    error: String::from("Probe failed after 3 attempts: timed out"),
                },
            ))
            .await;
        assert!(matches!(outcome, ExecutionOutcome::Failed(ref m) if m.contains("timed out")));
    }
}
