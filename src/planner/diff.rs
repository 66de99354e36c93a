//! Reconciliation planner.
//!
//! Compares what the provider reports (live) with what the engine recorded
//! (tracked) for every catalog resource and decides one action per resource.
//! Planning is pure: no I/O, no clock reads besides the plan timestamp.

use chrono::Utc;
use tracing::{debug, warn};

use crate::catalog::{Catalog, CatalogHasher, ResourceDescriptor};
use crate::probe::{LiveObservations, ProbeOutcome};
use crate::state::{TrackedMap, TrackedResourceState};

use super::plan::{ConflictReason, PlannedEntry, ReconciliationAction, ReconciliationPlan};

/// Computes reconciliation plans.
#[derive(Debug, Default)]
pub struct Planner {
    hasher: CatalogHasher,
}

impl Planner {
    /// Creates a new planner.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: CatalogHasher::new(),
        }
    }

    /// Plans every catalog resource in forward dependency order.
    ///
    /// A resource missing from `live` is treated as a failed probe.
    #[must_use]
    pub fn plan(
        &self,
        catalog: &Catalog,
        live: &LiveObservations,
        tracked: &TrackedMap,
    ) -> ReconciliationPlan {
        let entries = catalog
            .all_descriptors()
            .iter()
            .map(|descriptor| {
                let action = Self::decide(
                    descriptor,
                    live.get(&descriptor.logical_name),
                    tracked.get(&descriptor.logical_name),
                );
                debug!("Planned {}", action);
                PlannedEntry {
                    logical_name: descriptor.logical_name.clone(),
                    address: descriptor.address.clone(),
                    kind: descriptor.kind,
                    action,
                }
            })
            .collect();

        ReconciliationPlan {
            created_at: Utc::now(),
            catalog_hash: self.hasher.hash_catalog(catalog),
            entries,
        }
    }

    /// Decides the action for one resource.
    #[must_use]
    pub fn decide(
        descriptor: &ResourceDescriptor,
        live: Option<&ProbeOutcome>,
        tracked: Option<&TrackedResourceState>,
    ) -> ReconciliationAction {
        let name = descriptor.logical_name.clone();

        let live = match live {
            Some(Ok(state)) => state,
            Some(Err(e)) => {
                return ReconciliationAction::ProbeFailed {
                    name,
                    error: e.to_string(),
                };
            }
            None => {
                return ReconciliationAction::ProbeFailed {
                    name,
                    error: String::from("resource was not probed"),
                };
            }
        };

        if !live.exists {
            return match tracked {
                None => ReconciliationAction::Create { name },
                Some(t) => ReconciliationAction::Conflict {
                    name,
                    reason: ConflictReason::StaleTracking {
                        tracked_id: t.native_id.clone(),
                    },
                },
            };
        }

        let Some(live_id) = live.native_id.clone() else {
            warn!("'{name}' exists but the provider returned no ID");
            return ReconciliationAction::ProbeFailed {
                name,
                error: String::from("provider reported the resource without an ID"),
            };
        };

        match tracked {
            None => ReconciliationAction::Import {
                name,
                native_id: live_id,
            },
            Some(t) if t.native_id == live_id => ReconciliationAction::NoOp { name },
            Some(t) => ReconciliationAction::Conflict {
                name,
                reason: ConflictReason::Drift {
                    tracked_id: t.native_id.clone(),
                    live_id,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ResourceKind, TemplateParams};
    use crate::error::ProbeError;
    use crate::probe::LiveResourceState;
    use std::collections::{BTreeMap, HashMap};

    fn catalog() -> Catalog {
        Catalog::new(
            vec![
                ResourceDescriptor::new("vm", ResourceKind::Compute, "{project}-vm")
                    .unwrap()
                    .depends_on("subnet"),
                ResourceDescriptor::new("network", ResourceKind::Network, "{project}-vpc").unwrap(),
                ResourceDescriptor::new("subnet", ResourceKind::Subnet, "{project}-subnet")
                    .unwrap()
                    .depends_on("network"),
            ],
            TemplateParams::new("demo", "dev"),
        )
        .unwrap()
    }

    fn present(name: &str, id: &str) -> (String, ProbeOutcome) {
        (
            name.to_string(),
            Ok(LiveResourceState::present(name, id, BTreeMap::new())),
        )
    }

    fn absent(name: &str) -> (String, ProbeOutcome) {
        (name.to_string(), Ok(LiveResourceState::absent(name)))
    }

    fn tracked(name: &str, id: &str) -> (String, TrackedResourceState) {
        (
            name.to_string(),
            TrackedResourceState {
                logical_name: name.to_string(),
                address: name.to_string(),
                native_id: id.to_string(),
                last_known_attributes: BTreeMap::new(),
            },
        )
    }

    #[test]
    fn test_all_live_untracked_imports_in_dependency_order() {
        let live: LiveObservations = HashMap::from([
            present("network", "vpc-1"),
            present("subnet", "subnet-1"),
            present("vm", "i-1"),
        ]);
        let plan = Planner::new().plan(&catalog(), &live, &TrackedMap::new());

        assert_eq!(
            plan.actions(),
            vec![
                &ReconciliationAction::Import {
                    name: String::from("network"),
                    native_id: String::from("vpc-1"),
                },
                &ReconciliationAction::Import {
                    name: String::from("subnet"),
                    native_id: String::from("subnet-1"),
                },
                &ReconciliationAction::Import {
                    name: String::from("vm"),
                    native_id: String::from("i-1"),
                },
            ]
        );
    }

    #[test]
    fn test_decision_table() {
        let live: LiveObservations = HashMap::from([
            absent("network"),
            absent("subnet"),
            present("vm", "i-456"),
        ]);
        let tracked: TrackedMap = HashMap::from([tracked("subnet", "subnet-9"), tracked("vm", "i-123")]);
        let plan = Planner::new().plan(&catalog(), &live, &tracked);

        assert_eq!(plan.entries[0].action, ReconciliationAction::Create {
            name: String::from("network")
        });
        assert_eq!(
            plan.entries[1].action,
            ReconciliationAction::Conflict {
                name: String::from("subnet"),
                reason: ConflictReason::StaleTracking {
                    tracked_id: String::from("subnet-9")
                },
            }
        );
        assert_eq!(
            plan.entries[2].action,
            ReconciliationAction::Conflict {
                name: String::from("vm"),
                reason: ConflictReason::Drift {
                    tracked_id: String::from("i-123"),
                    live_id: String::from("i-456"),
                },
            }
        );
    }

    #[test]
    fn test_matching_ids_are_noop_and_stable() {
        let live: LiveObservations = HashMap::from([
            present("network", "vpc-1"),
            absent("subnet"),
            present("vm", "i-1"),
        ]);
        let tracked: TrackedMap = HashMap::from([tracked("network", "vpc-1"), tracked("vm", "i-1")]);
        let planner = Planner::new();

        let first = planner.plan(&catalog(), &live, &tracked);
        let second = planner.plan(&catalog(), &live, &tracked);

        assert_eq!(first.actions(), second.actions());
        assert_eq!(first.catalog_hash, second.catalog_hash);
        assert_eq!(first.entries[0].action.label(), "noop");
        assert_eq!(first.entries[1].action.label(), "create");
    }

    #[test]
    fn test_probe_failure_is_planned() {
        let live: LiveObservations = HashMap::from([
            present("network", "vpc-1"),
            (
                String::from("subnet"),
                Err(ProbeError::Failed {
                    attempts: 3,
                    last_error: String::from("RequestLimitExceeded"),
                }),
            ),
        ]);
        let plan = Planner::new().plan(&catalog(), &live, &TrackedMap::new());

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.probe_failure_count(), 2);
        match &plan.entries[1].action {
            ReconciliationAction::ProbeFailed { error, .. } => {
                assert!(error.contains("RequestLimitExceeded"));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_live_without_id_is_probe_failure() {
        let mut state = LiveResourceState::absent("network");
        state.exists = true;
        let descriptor = ResourceDescriptor::new("network", ResourceKind::Network, "x").unwrap();
        let action = Planner::decide(&descriptor, Some(&Ok(state)), None);
        assert_eq!(action.label(), "probe-failed");
    }
}
