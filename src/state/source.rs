//! Tracked state source trait definition.
//!
//! A source knows where the engine's state lives and how to hold the
//! reconciler's run lock next to it. It never writes the state itself.

use async_trait::async_trait;

use crate::error::Result;
use super::lock::LockInfo;

/// Trait for tracked state backends.
#[async_trait]
pub trait TrackedStateSource: Send + Sync {
    /// Loads the raw state document.
    ///
    /// Returns `None` if the engine has not written any state yet.
    async fn load_raw(&self) -> Result<Option<String>>;

    /// Acquires the run lock.
    ///
    /// Returns lock information if successful.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Pushes the expiry of a held lock forward.
    ///
    /// Fails with `LockNotHeld` if `lock_id` no longer holds the lock.
    async fn refresh_lock(&self, lock_id: &str) -> Result<LockInfo>;

    /// Releases the run lock.
    ///
    /// Releasing when no lock is in place is a no-op. Fails with
    /// `LockNotHeld`, leaving the lock alone, if another ID holds it.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Removes the run lock regardless of holder.
    async fn force_unlock(&self) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if the run lock is held and not expired.
    async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .get_lock_info()
            .await?
            .is_some_and(|info| !info.is_expired()))
    }

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;

    /// Human-readable location of the state.
    fn location(&self) -> String;
}

#[async_trait]
impl TrackedStateSource for Box<dyn TrackedStateSource> {
    async fn load_raw(&self) -> Result<Option<String>> {
        (**self).load_raw().await
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder).await
    }

    async fn refresh_lock(&self, lock_id: &str) -> Result<LockInfo> {
        (**self).refresh_lock(lock_id).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn force_unlock(&self) -> Result<()> {
        (**self).force_unlock().await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).get_lock_info().await
    }

    async fn is_locked(&self) -> Result<bool> {
        (**self).is_locked().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }

    fn location(&self) -> String {
        (**self).location()
    }
}
