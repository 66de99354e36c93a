//! S3 tracked state backend.
//!
//! Reads the object Terraform's S3 backend writes (`bucket` + `key`) and
//! keeps the run lock in a sibling object, `<key>.converge.lock`.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{ConvergeError, Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LOCK_SUFFIX, LockInfo, holder_or_generated, not_held};
use super::source::TrackedStateSource;

/// S3-based tracked state.
#[derive(Debug, Clone)]
pub struct S3StateSource {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// State object key.
    key: String,
}

impl S3StateSource {
    /// Creates a new S3 state source.
    pub async fn new(bucket: &str, key: &str, region: Option<&str>) -> Self {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        Self::with_client(Client::new(&config), bucket, key)
    }

    /// Creates a new S3 state source with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, key: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            key: key.trim_start_matches('/').to_string(),
        }
    }

    fn lock_key(&self) -> String {
        format!("{}{LOCK_SUFFIX}", self.key)
    }

    /// Gets an object from S3.
    async fn get_object(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response.body.collect().await.map_err(|e| {
                    ConvergeError::State(StateError::s3(format!("Failed to read S3 object: {e}")))
                })?;

                let content = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    ConvergeError::State(StateError::Corrupted {
                        message: format!("Invalid UTF-8 in S3 object: {e}"),
                    })
                })?;

                Ok(Some(content))
            }
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(ConvergeError::State(StateError::s3(format!(
                        "S3 get error: {service_err}"
                    ))))
                }
            }
        }
    }

    /// Puts an object to S3.
    async fn put_object(&self, key: &str, content: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(content.as_bytes().to_vec().into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| ConvergeError::State(StateError::s3(format!("S3 put error: {e}"))))?;

        Ok(())
    }

    /// Deletes an object from S3.
    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ConvergeError::State(StateError::s3(format!("S3 delete error: {e}"))))?;

        Ok(())
    }
}

#[async_trait]
impl TrackedStateSource for S3StateSource {
    async fn load_raw(&self) -> Result<Option<String>> {
        debug!("Loading tracked state from s3://{}/{}", self.bucket, self.key);

        let content = self.get_object(&self.key).await?;
        if content.is_some() {
            info!("Loaded tracked state from s3://{}/{}", self.bucket, self.key);
        } else {
            debug!("No state found in S3");
        }
        Ok(content)
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        let key = self.lock_key();

        if let Some(content) = self.get_object(&key).await? {
            let existing = LockInfo::from_json(&content)?;
            if !existing.is_expired() {
                return Err(ConvergeError::State(StateError::LockedByOther {
                    holder: existing.holder.clone(),
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!("Expired lock found, taking over");
        }

        let lock_info = LockInfo::new(&holder_or_generated(holder));
        self.put_object(&key, &lock_info.to_json()?).await?;

        info!(
            "Acquired run lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn refresh_lock(&self, lock_id: &str) -> Result<LockInfo> {
        let key = self.lock_key();
        let existing = match self.get_object(&key).await? {
            Some(content) => Some(LockInfo::from_json(&content)?),
            None => None,
        };

        match existing {
            Some(lock) if lock.lock_id == lock_id => {
                let refreshed = lock.refreshed();
                self.put_object(&key, &refreshed.to_json()?).await?;
                debug!("Refreshed run lock {lock_id}");
                Ok(refreshed)
            }
            other => Err(not_held(lock_id, other.as_ref())),
        }
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        let key = self.lock_key();

        let Some(content) = self.get_object(&key).await? else {
            debug!("No run lock to release");
            return Ok(());
        };

        let existing = LockInfo::from_json(&content)?;
        if existing.lock_id != lock_id {
            return Err(not_held(lock_id, Some(&existing)));
        }
        self.delete_object(&key).await?;
        info!("Released run lock: {lock_id}");
        Ok(())
    }

    async fn force_unlock(&self) -> Result<()> {
        let key = self.lock_key();
        info!("Force-removing run lock: s3://{}/{key}", self.bucket);
        self.delete_object(&key).await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        match self.get_object(&self.lock_key()).await? {
            Some(content) => LockInfo::from_json(&content).map(Some),
            None => Ok(None),
        }
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
