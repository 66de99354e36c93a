//! Run locking.
//!
//! The reconciler holds a lock next to the tracked state while it imports
//! or removes anything, so two operators cannot reconcile the same
//! environment at once. This lock is separate from the engine's own state
//! lock, which Terraform takes for each command.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConvergeError, StateError};

/// Lock expiry duration in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 300; // 5 minutes

/// How often an active run pushes its lock expiry forward.
pub const LOCK_REFRESH_SECS: u64 = 60;

/// Suffix appended to the state path or key to name the lock.
pub const LOCK_SUFFIX: &str = ".converge.lock";

/// Information about a run lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
    /// Last heartbeat from the holder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl LockInfo {
    /// Creates a new lock info.
    #[must_use]
    pub fn new(holder: &str) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(LOCK_EXPIRY_SECS),
            refreshed_at: None,
        }
    }

    /// Returns the same lock with its expiry pushed forward from now.
    #[must_use]
    pub fn refreshed(&self) -> Self {
        let now = Utc::now();
        Self {
            expires_at: now + chrono::Duration::seconds(LOCK_EXPIRY_SECS),
            refreshed_at: Some(now),
            ..self.clone()
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Returns the remaining time until expiry in seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        let remaining = self.expires_at - Utc::now();
        remaining.num_seconds().max(0)
    }

    /// Parses a serialized lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a valid lock document.
    pub fn from_json(content: &str) -> crate::error::Result<Self> {
        serde_json::from_str(content).map_err(|e| {
            crate::error::StateError::corrupted(format!("Failed to parse lock: {e}")).into()
        })
    }

    /// Serializes the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            crate::error::StateError::SerializationError {
                message: format!("Failed to serialize lock: {e}"),
            }
            .into()
        })
    }
}

/// Error for an operation on a lock the caller does not hold.
#[must_use]
pub fn not_held(lock_id: &str, current: Option<&LockInfo>) -> ConvergeError {
    let current = current.map_or_else(
        || String::from("no lock is in place"),
        |c| format!("lock {} is held by {} since {}", c.lock_id, c.holder, c.acquired_at.to_rfc3339()),
    );
    ConvergeError::State(StateError::LockNotHeld {
        lock_id: lock_id.to_string(),
        current,
    })
}

/// Resolves the holder name to record, generating one when empty.
#[must_use]
pub fn holder_or_generated(holder: &str) -> String {
    if holder.is_empty() {
        generate_holder_id()
    } else {
        holder.to_string()
    }
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get()
        .map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}
