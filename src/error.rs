//! Error types for the convergence engine.
//!
//! The hierarchy follows the run lifecycle: configuration and catalog
//! loading, tracked-state access, live probing, declarative engine calls,
//! and reconciliation control flow.
//!
//! Only configuration-class errors abort a run. Per-resource errors
//! ([`ProbeError`], [`EngineError`]) are captured into plan entries and
//! execution outcomes instead of being propagated.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the convergence engine.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tracked state errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Live probe errors.
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Declarative engine errors.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration and catalog errors. All of them abort the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate resource definition.
    #[error("Duplicate resource name: {name}")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },

    /// A resource depends on a name that is not in the catalog.
    #[error("Resource '{resource}' depends on unknown resource '{dependency}'")]
    UnknownDependency {
        /// Resource declaring the dependency.
        resource: String,
        /// The missing dependency.
        dependency: String,
    },

    /// Circular dependency detected.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency {
        /// Description of the cycle.
        cycle: String,
    },

    /// A native ID template could not be parsed or rendered.
    #[error("Invalid native ID template '{template}': {reason}")]
    InvalidTemplate {
        /// The offending template.
        template: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Tracked state errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("Tracked state is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The state file uses a format version this tool cannot read.
    #[error("Unsupported tracked state version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the state file.
        found: u64,
        /// Supported version.
        supported: u64,
    },

    /// Run lock acquisition failed.
    #[error("Failed to acquire run lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// Run lock is held by another process.
    #[error("Run lock is held by another process (holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// The caller's lock ID does not match the lock in place.
    #[error("Run lock {lock_id} is not held: {current}")]
    LockNotHeld {
        /// Lock ID the caller presented.
        lock_id: String,
        /// What is actually there.
        current: String,
    },

    /// S3 backend error.
    #[error("S3 state backend error: {message}")]
    S3Error {
        /// Description of the S3 error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Live probe errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// The resource does not exist. Benign; drives the create/import branch.
    #[error("Resource not found: {lookup}")]
    NotFound {
        /// Identifier that was looked up.
        lookup: String,
    },

    /// A retryable failure (network, throttling, expired credentials).
    #[error("Transient probe failure: {message}")]
    Transient {
        /// Provider error text, verbatim.
        message: String,
    },

    /// A single attempt exceeded its deadline.
    #[error("Probe timed out after {timeout_secs}s")]
    Timeout {
        /// The deadline that was exceeded.
        timeout_secs: u64,
    },

    /// Retries exhausted.
    #[error("Probe failed after {attempts} attempts: {last_error}")]
    Failed {
        /// Number of attempts made.
        attempts: u32,
        /// The last error observed, verbatim.
        last_error: String,
    },
}

/// Declarative engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine exited unsuccessfully.
    #[error("`{command}` failed: {stderr}")]
    CommandFailed {
        /// Command line that was run.
        command: String,
        /// Captured stderr, verbatim.
        stderr: String,
    },

    /// The engine binary could not be started.
    #[error("Failed to start `{binary}`: {message}")]
    SpawnFailed {
        /// Binary name.
        binary: String,
        /// OS error text.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reconciliation was aborted before any action executed.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },

    /// The named resource is not part of the catalog.
    #[error("Unknown resource: {name}")]
    UnknownResource {
        /// The requested logical name.
        name: String,
    },

    /// The operator declined a confirmation prompt.
    #[error("Operator declined: {action}")]
    Declined {
        /// What was being confirmed.
        action: String,
    },
}

/// Result type alias for convergence operations.
pub type Result<T> = std::result::Result<T, ConvergeError>;

impl ConvergeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Probe(ProbeError::Transient { .. } | ProbeError::Timeout { .. })
                | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns true if this error must abort the whole run.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::State(
                    StateError::Corrupted { .. }
                        | StateError::UnsupportedVersion { .. }
                        | StateError::LockedByOther { .. }
                )
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.into(),
            reason: reason.into(),
        }
    }
}

impl StateError {
    /// Creates an S3 error with the given message.
    #[must_use]
    pub fn s3(message: impl Into<String>) -> Self {
        Self::S3Error {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

impl EngineError {
    /// Returns true if the engine refused an import because the address
    /// already tracks a resource.
    #[must_use]
    pub fn is_already_managed(&self) -> bool {
        matches!(self, Self::CommandFailed { stderr, .. } if stderr.contains("Resource already managed"))
    }

    /// Returns the engine's own error text.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::CommandFailed { stderr, .. } => stderr,
            Self::SpawnFailed { message, .. } => message,
        }
    }
}

impl ProbeError {
    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Returns true if another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}
