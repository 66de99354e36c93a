//! Reconciler driving a convergence run.
//!
//! A run moves through `Start -> Probing -> Planning -> Executing -> Reported`
//! and ends either converged or needing attention. Configuration-class
//! errors abort before anything executes; per-resource problems end up in
//! the report.

use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::cloud::CloudQuery;
use crate::confirm::Confirmer;
use crate::engine::DeclarativeEngine;
use crate::error::{ConvergeError, ReconcileError, Result};
use crate::planner::{
    ActionExecutor, ConflictReason, ExecutionOutcome, Planner, ReconciliationAction,
    ReconciliationPlan,
};
use crate::probe::{LiveObservations, Prober};
use crate::report::ConvergenceReport;
use crate::state::{LOCK_REFRESH_SECS, LockInfo, TrackedMap, TrackedStateReader, TrackedStateSource};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Nothing has happened yet.
    Start,
    /// Querying the provider.
    Probing,
    /// Computing the plan.
    Planning,
    /// Running imports.
    Executing,
    /// The report is final.
    Reported,
}

/// What a run is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Import existing untracked resources; never create.
    ImportIfMissing,
    /// Import, then run the engine's apply for anything missing.
    Apply {
        /// Skip both our prompt and the engine's.
        auto_approve: bool,
    },
}

/// Result of resolving one conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// The stale address was removed from tracked state.
    Removed {
        /// Engine address.
        address: String,
    },
    /// The address was removed and re-imported with the live ID.
    Reimported {
        /// Engine address.
        address: String,
        /// ID now tracked.
        native_id: String,
    },
    /// The resource is not in conflict.
    NothingToResolve {
        /// What the planner decided instead.
        action: ReconciliationAction,
    },
}

/// A resource whose live and tracked state disagree.
#[derive(Debug, Clone, Serialize)]
pub struct DriftEntry {
    /// Logical name.
    pub logical_name: String,
    /// Engine address.
    pub address: String,
    /// What the planner would do.
    pub action: ReconciliationAction,
}

/// Report of drift detection.
#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Resources that are not in agreement.
    pub drifted: Vec<DriftEntry>,
    /// Tracked addresses no catalog entry claims.
    pub unclaimed: Vec<String>,
    /// Total number of catalog resources.
    pub total_resources: usize,
}

/// Drives probing, planning and execution for one catalog.
pub struct Reconciler<Q: CloudQuery, S: TrackedStateSource, E: DeclarativeEngine> {
    catalog: Catalog,
    prober: Prober<Q>,
    reader: TrackedStateReader<S>,
    engine: E,
    confirmer: Box<dyn Confirmer>,
    planner: Planner,
    cancelled: Arc<AtomicBool>,
    dry_run: bool,
    phase: Mutex<RunPhase>,
}

impl<Q: CloudQuery, S: TrackedStateSource, E: DeclarativeEngine> Reconciler<Q, S, E> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(
        catalog: Catalog,
        prober: Prober<Q>,
        reader: TrackedStateReader<S>,
        engine: E,
        confirmer: Box<dyn Confirmer>,
    ) -> Self {
        Self {
            catalog,
            prober,
            reader,
            engine,
            confirmer,
            planner: Planner::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            dry_run: false,
            phase: Mutex::new(RunPhase::Start),
        }
    }

    /// Plans and reports without importing or applying.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Shares a cancellation flag, checked between actions.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Returns the catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Returns the tracked state reader.
    #[must_use]
    pub const fn reader(&self) -> &TrackedStateReader<S> {
        &self.reader
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase.lock().map_or(RunPhase::Start, |p| *p)
    }

    fn enter(&self, phase: RunPhase) {
        debug!("Entering phase {phase:?}");
        if let Ok(mut current) = self.phase.lock() {
            *current = phase;
        }
    }

    /// Drives `work` while refreshing the run lock so it cannot expire under
    /// a long engine apply.
    async fn while_locked<T>(&self, lock: &LockInfo, work: impl Future<Output = Result<T>>) -> Result<T> {
        let mut heartbeat = tokio::time::interval(Duration::from_secs(LOCK_REFRESH_SECS));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        tokio::pin!(work);
        loop {
            tokio::select! {
                result = &mut work => return result,
                _ = heartbeat.tick() => {
                    if let Err(e) = self.reader.source().refresh_lock(&lock.lock_id).await {
                        warn!("Failed to refresh run lock {}: {e}", lock.lock_id);
                    }
                }
            }
        }
    }

    async fn observe(&self) -> Result<(LiveObservations, TrackedMap, Vec<String>)> {
        self.enter(RunPhase::Probing);
        let tracked_state = self.reader.load().await?;
        let tracked = tracked_state.for_catalog(&self.catalog);
        let unclaimed = tracked_state
            .unclaimed(&self.catalog)
            .into_iter()
            .map(String::from)
            .collect();
        let live = self.prober.probe_all(&self.catalog).await;
        Ok((live, tracked, unclaimed))
    }

    /// Probes every resource and computes a plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracked state cannot be read.
    pub async fn plan(&self) -> Result<ReconciliationPlan> {
        let (live, tracked, _) = self.observe().await?;
        self.enter(RunPhase::Planning);
        let plan = self.planner.plan(&self.catalog, &live, &tracked);
        info!(
            "Plan: {} imports, {} creates, {} conflicts, {} probe failures",
            plan.import_count(),
            plan.create_count(),
            plan.conflict_count(),
            plan.probe_failure_count()
        );
        Ok(plan)
    }

    /// Runs a full convergence pass under the run lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the run lock is held elsewhere, the tracked state
    /// is unreadable, or the operator declines.
    pub async fn run(&self, mode: RunMode) -> Result<ConvergenceReport> {
        self.enter(RunPhase::Start);
        let lock = self.reader.source().acquire_lock("").await?;

        let result = self.while_locked(&lock, self.run_locked(mode)).await;

        if let Err(e) = self.reader.source().release_lock(&lock.lock_id).await {
            error!("Failed to release run lock {}: {e}", lock.lock_id);
        }
        result
    }

    async fn run_locked(&self, mode: RunMode) -> Result<ConvergenceReport> {
        let plan = self.plan().await?;

        if let RunMode::Apply {
            auto_approve: false,
        } = mode
            && !self.dry_run
            && plan.import_count() > 0
        {
            let prompt = format!(
                "Import {} existing resources into tracked state?",
                plan.import_count()
            );
            if !self.confirmer.confirm(&prompt)? {
                return Err(ReconcileError::Declined {
                    action: String::from("import"),
                }
                .into());
            }
        }

        self.enter(RunPhase::Executing);
        let executor = ActionExecutor::new(&self.engine)
            .with_dry_run(self.dry_run)
            .with_cancel_flag(Arc::clone(&self.cancelled));
        let results = executor.execute_plan(&plan).await;
        let mut report = ConvergenceReport::from_results(results);

        if let RunMode::Apply { auto_approve } = mode
            && report.needs_engine_apply()
        {
            let outcome = self.engine_apply(&report, auto_approve).await;
            report = report.with_engine_apply(outcome);
        }

        self.enter(RunPhase::Reported);
        info!(
            "Run {}: {} applied, {} skipped, {} deferred, {} conflicts, {} failures",
            report.status,
            report.applied,
            report.skipped,
            report.deferred,
            report.conflicts.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn engine_apply(&self, report: &ConvergenceReport, auto_approve: bool) -> ExecutionOutcome {
        if !report.is_converged() {
            warn!("Not running engine apply: resolve conflicts and failures first");
            return ExecutionOutcome::Skipped(String::from("needs attention"));
        }
        if self.dry_run {
            return ExecutionOutcome::Skipped(String::from("dry run"));
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return ExecutionOutcome::Cancelled;
        }

        info!("Handing {} missing resources to engine apply", report.deferred);
        match self.engine.apply(auto_approve).await {
            Ok(()) => ExecutionOutcome::Applied,
            Err(e) => {
                error!("Engine apply failed: {e}");
                ExecutionOutcome::Failed(e.detail().to_string())
            }
        }
    }

    /// Reports resources whose live and tracked state disagree.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracked state cannot be read.
    pub async fn check_drift(&self) -> Result<DriftReport> {
        let (live, tracked, unclaimed) = self.observe().await?;
        self.enter(RunPhase::Planning);
        let plan = self.planner.plan(&self.catalog, &live, &tracked);

        let drifted: Vec<DriftEntry> = plan
            .entries
            .into_iter()
            .filter(|e| !matches!(e.action, ReconciliationAction::NoOp { .. }))
            .map(|e| DriftEntry {
                logical_name: e.logical_name,
                address: e.address,
                action: e.action,
            })
            .collect();

        self.enter(RunPhase::Reported);
        Ok(DriftReport {
            has_drift: !drifted.is_empty() || !unclaimed.is_empty(),
            drifted,
            unclaimed,
            total_resources: self.catalog.len(),
        })
    }

    /// Resolves a conflict on one resource after typed confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown resource, a held run lock, a declined
    /// confirmation, or an engine failure.
    pub async fn resolve(&self, logical_name: &str) -> Result<ResolveOutcome> {
        let descriptor = self.catalog.describe(logical_name).ok_or_else(|| {
            ReconcileError::UnknownResource {
                name: logical_name.to_string(),
            }
        })?;

        let lock = self.reader.source().acquire_lock("").await?;
        let result = self
            .while_locked(&lock, self.resolve_locked(descriptor.logical_name.as_str()))
            .await;
        if let Err(e) = self.reader.source().release_lock(&lock.lock_id).await {
            error!("Failed to release run lock {}: {e}", lock.lock_id);
        }
        result
    }

    async fn resolve_locked(&self, logical_name: &str) -> Result<ResolveOutcome> {
        let descriptor = self.catalog.describe(logical_name).ok_or_else(|| {
            ReconcileError::UnknownResource {
                name: logical_name.to_string(),
            }
        })?;

        self.enter(RunPhase::Probing);
        let tracked = self.reader.read_tracked(&self.catalog).await?;
        let lookup = self.catalog.resolved_id(logical_name).unwrap_or_default();
        let live = self.prober.probe(descriptor, lookup).await;

        self.enter(RunPhase::Planning);
        let action = Planner::decide(descriptor, Some(&live), tracked.get(logical_name));
        let reason = match action {
            ReconciliationAction::Conflict { reason, .. } => reason,
            other => {
                info!("'{logical_name}' is not in conflict: {other}");
                self.enter(RunPhase::Reported);
                return Ok(ResolveOutcome::NothingToResolve { action: other });
            }
        };

        let address = descriptor.address.clone();
        let mut prompt = match &reason {
            ConflictReason::StaleTracking { tracked_id } => format!(
                "'{logical_name}' is tracked as {tracked_id} at {address} but no longer exists.\n\
                 This removes {address} from tracked state."
            ),
            ConflictReason::Drift {
                tracked_id,
                live_id,
            } => format!(
                "'{logical_name}' is tracked as {tracked_id} at {address} but the live resource is {live_id}.\n\
                 This removes {address} from tracked state and imports {live_id}."
            ),
        };
        let dependents = self.catalog.dependents_of(logical_name);
        if !dependents.is_empty() {
            prompt.push_str(&format!("\nDepended on by: {}", dependents.join(", ")));
        }
        if !self.confirmer.confirm_typed(&prompt, logical_name)? {
            return Err(ReconcileError::Declined {
                action: format!("resolve {logical_name}"),
            }
            .into());
        }

        self.enter(RunPhase::Executing);
        let engine_tracks = self
            .engine
            .list()
            .await
            .map_err(ConvergeError::Engine)?
            .contains(&address);
        if engine_tracks {
            self.engine
                .remove(&address)
                .await
                .map_err(ConvergeError::Engine)?;
        } else {
            warn!("{address} is not in the engine's state list; nothing to remove");
        }

        let outcome = match reason {
            ConflictReason::StaleTracking { .. } => ResolveOutcome::Removed { address },
            ConflictReason::Drift { live_id, .. } => {
                self.engine
                    .import(&address, &live_id)
                    .await
                    .map_err(ConvergeError::Engine)?;
                ResolveOutcome::Reimported {
                    address,
                    native_id: live_id,
                }
            }
        };

        self.enter(RunPhase::Reported);
        info!("Resolved '{logical_name}'");
        Ok(outcome)
    }
}

impl DriftReport {
    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_drift {
            return write!(f, "No drift detected - state is converged");
        }
        writeln!(f, "Drift detected:")?;
        for entry in &self.drifted {
            writeln!(f, "  - {}", entry.action)?;
        }
        for address in &self.unclaimed {
            writeln!(f, "  - {address} is tracked but not in the catalog")?;
        }
        Ok(())
    }
}
