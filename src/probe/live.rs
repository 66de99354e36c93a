//! Observed live state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::cloud::STATE_ATTRIBUTE;
use crate::error::ProbeError;

/// Provider lifecycle states that mean the resource is on its way out.
const SETTLING_STATES: &[&str] = &["shutting-down", "terminated", "deleting"];

/// What the cloud provider reported for one resource.
///
/// Observed fresh on every run and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveResourceState {
    /// Logical name of the resource.
    pub logical_name: String,
    /// Whether the provider reported the resource.
    pub exists: bool,
    /// Native ID, present when `exists` is true.
    pub native_id: Option<String>,
    /// Selected provider attributes.
    pub attributes: BTreeMap<String, String>,
    /// When the probe completed.
    pub probed_at: DateTime<Utc>,
}

/// Per-resource probe outcome.
pub type ProbeOutcome = Result<LiveResourceState, ProbeError>;

/// Probe outcomes keyed by logical name.
pub type LiveObservations = HashMap<String, ProbeOutcome>;

impl LiveResourceState {
    /// A resource the provider reported.
    #[must_use]
    pub fn present(
        logical_name: impl Into<String>,
        native_id: impl Into<String>,
        attributes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            exists: true,
            native_id: Some(native_id.into()),
            attributes,
            probed_at: Utc::now(),
        }
    }

    /// A resource the provider does not have.
    #[must_use]
    pub fn absent(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            exists: false,
            native_id: None,
            attributes: BTreeMap::new(),
            probed_at: Utc::now(),
        }
    }

    /// Returns the provider lifecycle state, if reported.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.attributes.get(STATE_ATTRIBUTE).map(String::as_str)
    }

    /// Returns true if the provider reports the resource as being torn down.
    ///
    /// Such a resource still counts as existing; the next run will see it gone.
    #[must_use]
    pub fn is_settling(&self) -> bool {
        self.state()
            .is_some_and(|s| SETTLING_STATES.iter().any(|t| s.eq_ignore_ascii_case(t)))
    }
}
