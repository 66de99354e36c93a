//! Declarative engine interface.
//!
//! The engine owns creation and tracking of resources. The reconciler only
//! asks it to list, import, forget and apply; it never edits engine state
//! directly.

mod terraform;

pub use terraform::TerraformEngine;

use async_trait::async_trait;

use crate::error::EngineError;

/// Operations the reconciler needs from a declarative engine.
#[async_trait]
pub trait DeclarativeEngine: Send + Sync {
    /// Lists tracked addresses.
    async fn list(&self) -> Result<Vec<String>, EngineError>;

    /// Starts tracking an existing resource under `address`.
    async fn import(&self, address: &str, native_id: &str) -> Result<(), EngineError>;

    /// Stops tracking `address` without touching the resource.
    async fn remove(&self, address: &str) -> Result<(), EngineError>;

    /// Runs the engine's own apply phase.
    async fn apply(&self, auto_approve: bool) -> Result<(), EngineError>;
}
