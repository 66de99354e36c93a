//! Tracked state module.
//!
//! This module reads the declarative engine's state and manages the
//! reconciler's run lock. Backends are a local `terraform.tfstate` file or
//! the object written by Terraform's S3 backend.

mod local;
mod lock;
mod reader;
mod s3;
mod source;
mod types;

pub use local::{DEFAULT_STATE_FILE, LocalStateSource};
pub use lock::{LOCK_EXPIRY_SECS, LOCK_REFRESH_SECS, LOCK_SUFFIX, LockInfo, generate_holder_id};
pub use reader::TrackedStateReader;
pub use s3::S3StateSource;
pub use source::TrackedStateSource;
pub use types::{
    STATE_VERSION, TrackedInstance, TrackedMap, TrackedResourceState, TrackedState,
};

use std::path::Path;

use crate::config::{StateBackend, StateConfig};
use crate::error::{ConfigError, Result};

/// Opens the state source described by `config`.
///
/// Relative local paths resolve against `base_dir`, normally the engine's
/// working directory.
///
/// # Errors
///
/// Returns an error if the S3 backend is selected without a bucket or key.
pub async fn open_source(
    config: &StateConfig,
    base_dir: &Path,
) -> Result<Box<dyn TrackedStateSource>> {
    match config.backend {
        StateBackend::Local => {
            let path = config
                .path
                .as_deref()
                .map_or_else(|| base_dir.join(DEFAULT_STATE_FILE), |p| base_dir.join(p));
            Ok(Box::new(LocalStateSource::new(path)))
        }
        StateBackend::S3 => {
            let bucket = config
                .bucket
                .as_deref()
                .ok_or_else(|| ConfigError::validation("S3 bucket is required", "state.bucket"))?;
            let key = config
                .key
                .as_deref()
                .ok_or_else(|| ConfigError::validation("S3 key is required", "state.key"))?;
            Ok(Box::new(
                S3StateSource::new(bucket, key, config.region.as_deref()).await,
            ))
        }
    }
}
