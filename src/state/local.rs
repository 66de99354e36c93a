//! Local tracked state backend.
//!
//! Reads a `terraform.tfstate` file written by Terraform's local backend and
//! keeps the run lock in a sibling file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ConvergeError, Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LOCK_SUFFIX, LockInfo, holder_or_generated, not_held};
use super::source::TrackedStateSource;

/// Default state file name.
pub const DEFAULT_STATE_FILE: &str = "terraform.tfstate";

/// Local file-based tracked state.
#[derive(Debug, Clone)]
pub struct LocalStateSource {
    /// Path to the state file.
    state_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
}

impl LocalStateSource {
    /// Creates a source for the given state file.
    #[must_use]
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let mut lock_name = state_path
            .file_name()
            .map_or_else(|| DEFAULT_STATE_FILE.into(), std::ffi::OsStr::to_os_string);
        lock_name.push(LOCK_SUFFIX);
        let lock_path = state_path.with_file_name(lock_name);

        Self {
            state_path,
            lock_path,
        }
    }

    /// Creates a source for `terraform.tfstate` inside `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(DEFAULT_STATE_FILE))
    }

    /// Returns the state file path.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Returns the lock file path.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Reads the lock file if it exists.
    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path).await.map_err(|e| {
            ConvergeError::State(StateError::LockFailed {
                message: format!("Failed to read lock file: {e}"),
            })
        })?;

        LockInfo::from_json(&content).map(Some)
    }

    /// Writes the lock file through a temporary file and a rename.
    async fn write_lock_file(&self, lock_info: &LockInfo) -> Result<()> {
        let content = lock_info.to_json()?;
        let temp_path = self.lock_path.with_extension("tmp");

        let lock_err = |what: &str, e: std::io::Error| {
            ConvergeError::State(StateError::LockFailed {
                message: format!("Failed to {what} lock file: {e}"),
            })
        };

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| lock_err("create", e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| lock_err("write", e))?;
        file.sync_all().await.map_err(|e| lock_err("sync", e))?;

        fs::rename(&temp_path, &self.lock_path)
            .await
            .map_err(|e| lock_err("rename", e))?;

        Ok(())
    }

    /// Deletes the lock file.
    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await.map_err(|e| {
                ConvergeError::State(StateError::LockFailed {
                    message: format!("Failed to delete lock file: {e}"),
                })
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl TrackedStateSource for LocalStateSource {
    async fn load_raw(&self) -> Result<Option<String>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        info!("Loading tracked state from: {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| {
            ConvergeError::State(StateError::Corrupted {
                message: format!("Failed to read state file: {e}"),
            })
        })?;

        Ok(Some(content))
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(ConvergeError::State(StateError::LockedByOther {
                    holder: existing.holder.clone(),
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!("Expired lock found, taking over");
        }

        let lock_info = LockInfo::new(&holder_or_generated(holder));
        self.write_lock_file(&lock_info).await?;

        info!(
            "Acquired run lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn refresh_lock(&self, lock_id: &str) -> Result<LockInfo> {
        match self.read_lock_file().await? {
            Some(existing) if existing.lock_id == lock_id => {
                let refreshed = existing.refreshed();
                self.write_lock_file(&refreshed).await?;
                debug!("Refreshed run lock {lock_id}");
                Ok(refreshed)
            }
            other => Err(not_held(lock_id, other.as_ref())),
        }
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        match self.read_lock_file().await? {
            Some(existing) if existing.lock_id == lock_id => {
                self.delete_lock_file().await?;
                info!("Released run lock: {lock_id}");
                Ok(())
            }
            Some(existing) => Err(not_held(lock_id, Some(&existing))),
            None => {
                debug!("No run lock to release");
                Ok(())
            }
        }
    }

    async fn force_unlock(&self) -> Result<()> {
        info!("Force-removing run lock: {}", self.lock_path.display());
        self.delete_lock_file().await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }

    fn location(&self) -> String {
        self.state_path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_source() -> (LocalStateSource, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = LocalStateSource::in_dir(temp_dir.path());
        (source, temp_dir)
    }

    #[test]
    fn test_lock_path_is_sibling() {
        let source = LocalStateSource::new("/infra/aws/terraform.tfstate");
        assert_eq!(
            source.lock_path(),
            Path::new("/infra/aws/terraform.tfstate.converge.lock")
        );
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (source, _temp) = create_test_source();
        assert!(source.load_raw().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_existing() {
        let (source, _temp) = create_test_source();
        std::fs::write(source.state_path(), r#"{"version":4}"#).unwrap();
        assert_eq!(
            source.load_raw().await.unwrap().as_deref(),
            Some(r#"{"version":4}"#)
        );
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (source, _temp) = create_test_source();

        let lock = source.acquire_lock("test-holder").await.unwrap();
        assert!(source.is_locked().await.unwrap());

        source.release_lock(&lock.lock_id).await.unwrap();
        assert!(!source.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_conflict() {
        let (source, _temp) = create_test_source();

        let _lock1 = source.acquire_lock("holder-1").await.unwrap();
        let err = source.acquire_lock("holder-2").await.unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("holder-1"));
    }

    #[tokio::test]
    async fn test_refresh_extends_held_lock() {
        let (source, _temp) = create_test_source();

        let lock = source.acquire_lock("holder-1").await.unwrap();
        let refreshed = source.refresh_lock(&lock.lock_id).await.unwrap();
        assert_eq!(refreshed.lock_id, lock.lock_id);

        let stored = source.get_lock_info().await.unwrap().unwrap();
        assert_eq!(stored, refreshed);
        assert!(stored.refreshed_at.is_some());

        assert!(source.refresh_lock("not-mine").await.is_err());
        source.release_lock(&lock.lock_id).await.unwrap();
        assert!(source.refresh_lock(&lock.lock_id).await.is_err());
    }

    #[tokio::test]
    async fn test_release_without_lock_is_noop() {
        let (source, _temp) = create_test_source();
        source.release_lock("anything").await.unwrap();
    }

    #[tokio::test]
    async fn test_release_with_wrong_id_keeps_lock() {
        let (source, _temp) = create_test_source();

        let _lock = source.acquire_lock("holder-1").await.unwrap();
        let err = source.release_lock("not-mine").await.unwrap_err();
        assert!(matches!(err, ConvergeError::State(StateError::LockNotHeld { .. })));
        assert!(err.to_string().contains("holder-1"));
        assert!(source.is_locked().await.unwrap());

        source.force_unlock().await.unwrap();
        assert!(!source.is_locked().await.unwrap());
    }
}
