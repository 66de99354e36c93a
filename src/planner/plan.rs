//! Reconciliation plan types.
//!
//! A plan holds one entry per catalog resource, in forward dependency order,
//! each carrying the action the planner decided on.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::ResourceKind;

/// Why a resource cannot be reconciled automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConflictReason {
    /// The engine tracks an ID the provider no longer has.
    StaleTracking {
        /// ID recorded by the engine.
        tracked_id: String,
    },
    /// The engine tracks one ID, the provider reports another.
    Drift {
        /// ID recorded by the engine.
        tracked_id: String,
        /// ID reported by the provider.
        live_id: String,
    },
}

/// What to do with one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconciliationAction {
    /// Live and tracked agree.
    NoOp {
        /// Logical name.
        name: String,
    },
    /// Live but untracked: hand the existing resource to the engine.
    Import {
        /// Logical name.
        name: String,
        /// ID reported by the provider.
        native_id: String,
    },
    /// Neither live nor tracked: the engine's apply phase creates it.
    Create {
        /// Logical name.
        name: String,
    },
    /// Live and tracked disagree. Never resolved automatically.
    Conflict {
        /// Logical name.
        name: String,
        /// What disagrees.
        #[serde(flatten)]
        reason: ConflictReason,
    },
    /// The resource could not be observed.
    ProbeFailed {
        /// Logical name.
        name: String,
        /// Provider error text.
        error: String,
    },
}

/// A planned action together with the descriptor fields the executor needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedEntry {
    /// Logical name.
    pub logical_name: String,
    /// Engine address.
    pub address: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Decided action.
    pub action: ReconciliationAction,
}

/// A complete reconciliation plan.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the catalog the plan was computed for.
    pub catalog_hash: String,
    /// Entries in forward dependency order.
    pub entries: Vec<PlannedEntry>,
}

impl ReconciliationAction {
    /// Logical name of the resource this action targets.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::NoOp { name }
            | Self::Import { name, .. }
            | Self::Create { name }
            | Self::Conflict { name, .. }
            | Self::ProbeFailed { name, .. } => name,
        }
    }

    /// Short label used in tables.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NoOp { .. } => "noop",
            Self::Import { .. } => "import",
            Self::Create { .. } => "create",
            Self::Conflict { .. } => "conflict",
            Self::ProbeFailed { .. } => "probe-failed",
        }
    }

    /// Returns true if the action changes anything.
    #[must_use]
    pub const fn is_change(&self) -> bool {
        matches!(self, Self::Import { .. } | Self::Create { .. })
    }
}

impl ReconciliationPlan {
    /// Returns true if no entry needs an import or a create.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.entries.iter().any(|e| e.action.is_change())
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the plan has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the entry for a logical name.
    #[must_use]
    pub fn entry(&self, logical_name: &str) -> Option<&PlannedEntry> {
        self.entries.iter().find(|e| e.logical_name == logical_name)
    }

    /// Returns the sequence of actions, without timestamps.
    #[must_use]
    pub fn actions(&self) -> Vec<&ReconciliationAction> {
        self.entries.iter().map(|e| &e.action).collect()
    }

    /// Number of imports.
    #[must_use]
    pub fn import_count(&self) -> usize {
        self.count(|a| matches!(a, ReconciliationAction::Import { .. }))
    }

    /// Number of creates.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.count(|a| matches!(a, ReconciliationAction::Create { .. }))
    }

    /// Number of conflicts.
    #[must_use]
    pub fn conflict_count(&self) -> usize {
        self.count(|a| matches!(a, ReconciliationAction::Conflict { .. }))
    }

    /// Number of resources that could not be probed.
    #[must_use]
    pub fn probe_failure_count(&self) -> usize {
        self.count(|a| matches!(a, ReconciliationAction::ProbeFailed { .. }))
    }

    fn count(&self, pred: impl Fn(&ReconciliationAction) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.action)).count()
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleTracking { tracked_id } => {
                write!(f, "tracked as '{tracked_id}' but not found live")
            }
            Self::Drift {
                tracked_id,
                live_id,
            } => write!(f, "tracked as '{tracked_id}' but live is '{live_id}'"),
        }
    }
}

impl std::fmt::Display for ReconciliationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoOp { name } => write!(f, "No change for '{name}'"),
            Self::Import { name, native_id } => write!(f, "Import '{name}' from {native_id}"),
            Self::Create { name } => write!(f, "Create '{name}' (engine apply)"),
            Self::Conflict { name, reason } => write!(f, "Conflict on '{name}': {reason}"),
            Self::ProbeFailed { name, error } => write!(f, "Could not probe '{name}': {error}"),
        }
    }
}

impl std::fmt::Display for ReconciliationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_noop() && self.conflict_count() == 0 && self.probe_failure_count() == 0 {
            return write!(f, "No changes required");
        }

        writeln!(f, "Reconciliation Plan ({} resources):", self.entries.len())?;
        for (i, entry) in self.entries.iter().enumerate() {
            writeln!(f, "  {i}. {}", entry.action)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(action: ReconciliationAction) -> PlannedEntry {
        PlannedEntry {
            logical_name: action.name().to_string(),
            address: format!("aws_vpc.{}", action.name()),
            kind: ResourceKind::Network,
            action,
        }
    }

    #[test]
    fn test_counts() {
        let plan = ReconciliationPlan {
            created_at: Utc::now(),
            catalog_hash: String::from("abc"),
            entries: vec![
                entry(ReconciliationAction::Import {
                    name: String::from("a"),
                    native_id: String::from("vpc-1"),
                }),
                entry(ReconciliationAction::Create {
                    name: String::from("b"),
                }),
                entry(ReconciliationAction::NoOp {
                    name: String::from("c"),
                }),
            ],
        };
        assert_eq!(plan.import_count(), 1);
        assert_eq!(plan.create_count(), 1);
        assert_eq!(plan.conflict_count(), 0);
        assert!(!plan.is_noop());
        assert_eq!(plan.entry("c").map(|e| e.action.label()), Some("noop"));
    }

    #[test]
    fn test_conflict_serializes_flat() {
        let action = ReconciliationAction::Conflict {
            name: String::from("vm"),
            reason: ConflictReason::Drift {
                tracked_id: String::from("vm-123"),
                live_id: String::from("vm-456"),
            },
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "conflict");
        assert_eq!(json["reason"], "drift");
        assert_eq!(json["live_id"], "vm-456");
    }

    #[test]
    fn test_display() {
        let reason = ConflictReason::StaleTracking {
            tracked_id: String::from("sg-1"),
        };
        assert_eq!(reason.to_string(), "tracked as 'sg-1' but not found live");
    }
}
