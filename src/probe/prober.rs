//! Live state prober.

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, ResourceDescriptor};
use crate::cloud::{CloudQuery, QueryOutcome};
use crate::config::{MAX_PROBE_CONCURRENCY, ProbeConfig};
use crate::error::ProbeError;

use super::live::{LiveObservations, LiveResourceState, ProbeOutcome};
use super::retry::RetryPolicy;

/// Observes live resources through a [`CloudQuery`].
///
/// Every call goes to the provider; nothing is cached between calls.
#[derive(Debug)]
pub struct Prober<Q: CloudQuery> {
    query: Q,
    policy: RetryPolicy,
    concurrency: usize,
}

impl<Q: CloudQuery> Prober<Q> {
    /// Creates a prober with the default policy.
    #[must_use]
    pub fn new(query: Q) -> Self {
        Self::from_config(query, &ProbeConfig::default())
    }

    /// Creates a prober tuned by the `probe:` configuration section.
    #[must_use]
    pub fn from_config(query: Q, config: &ProbeConfig) -> Self {
        Self {
            query,
            policy: RetryPolicy::from_config(config),
            concurrency: config.concurrency.clamp(1, MAX_PROBE_CONCURRENCY),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the underlying query.
    #[must_use]
    pub const fn query(&self) -> &Q {
        &self.query
    }

    /// Probes one resource using `lookup` as the provider-side key.
    ///
    /// A missing resource is a successful probe with `exists == false`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Failed`] once transient failures or timeouts have
    /// used up every attempt, or the non-retryable error from the query.
    pub async fn probe(
        &self,
        descriptor: &ResourceDescriptor,
        lookup: &str,
    ) -> Result<LiveResourceState, ProbeError> {
        let name = &descriptor.logical_name;
        let mut last_error: Option<ProbeError> = None;
        let mut attempts = 0;

        while self.policy.should_retry(attempts) {
            if attempts > 0 {
                let delay = self.policy.delay(attempts - 1);
                warn!(
                    "Probe of '{name}' failed (attempt {attempts}/{}), retrying in {delay:?}",
                    self.policy.max_attempts
                );
                tokio::time::sleep(delay).await;
            }
            attempts += 1;

            debug!("Probing {} '{name}' as '{lookup}'", descriptor.kind);
            let result = tokio::time::timeout(
                self.policy.attempt_timeout,
                self.query.query(descriptor.kind, lookup),
            )
            .await
            .unwrap_or_else(|_| {
                Err(ProbeError::Timeout {
                    timeout_secs: self.policy.attempt_timeout.as_secs(),
                })
            });

            match result {
                Ok(QueryOutcome::Found {
                    native_id,
                    attributes,
                }) => {
                    let live = LiveResourceState::present(name, native_id, attributes);
                    if live.is_settling() {
                        warn!(
                            "'{name}' exists but is {}; treating it as present",
                            live.state().unwrap_or("settling")
                        );
                    }
                    return Ok(live);
                }
                Ok(QueryOutcome::NotFound) => {
                    debug!("'{name}' not found");
                    return Ok(LiveResourceState::absent(name));
                }
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(ProbeError::Failed {
            attempts,
            last_error: last_error.map_or_else(String::new, |e| provider_text(&e)),
        })
    }

    /// Probes every catalog resource with bounded concurrency.
    pub async fn probe_all(&self, catalog: &Catalog) -> LiveObservations {
        info!(
            "Probing {} resources (concurrency {})",
            catalog.len(),
            self.concurrency
        );

        stream::iter(catalog.all_descriptors())
            .map(|descriptor| async move {
                let lookup = catalog
                    .resolved_id(&descriptor.logical_name)
                    .unwrap_or_default();
                let outcome: ProbeOutcome = self.probe(descriptor, lookup).await;
                (descriptor.logical_name.clone(), outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

/// The provider's own words for an error, without our prefix.
fn provider_text(error: &ProbeError) -> String {
    match error {
        ProbeError::Transient { message } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ResourceKind, TemplateParams};
    use crate::config::CloudProvider;
    use async_trait::async_trait;
    use mockall::mock;
    use std::collections::BTreeMap;
    use std::time::Duration;

    mock! {
        Query {}

        #[async_trait]
        impl CloudQuery for Query {
            async fn query(&self, kind: ResourceKind, lookup: &str) -> Result<QueryOutcome, ProbeError>;
            fn provider(&self) -> CloudProvider;
        }
    }

    /// Never answers for `hang`; reports everything else as found.
    struct HangingQuery {
        hang: &'static str,
    }

    #[async_trait]
    impl CloudQuery for HangingQuery {
        async fn query(&self, _kind: ResourceKind, lookup: &str) -> Result<QueryOutcome, ProbeError> {
            if lookup == self.hang {
                std::future::pending::<()>().await;
            }
            Ok(QueryOutcome::Found {
                native_id: format!("id-{lookup}"),
                attributes: BTreeMap::new(),
            })
        }

        fn provider(&self) -> CloudProvider {
            CloudProvider::Aws
        }
    }

    fn descriptor(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(name, ResourceKind::Network, "{name}").unwrap()
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_found() {
        let mut query = MockQuery::new();
        query.expect_query().times(1).returning(|_, lookup| {
            assert_eq!(lookup, "runners-dev-vpc");
            Ok(QueryOutcome::Found {
                native_id: String::from("vpc-1"),
                attributes: BTreeMap::new(),
            })
        });

        let prober = Prober::new(query).with_policy(fast_policy());
        let live = prober.probe(&descriptor("network"), "runners-dev-vpc").await.unwrap();
        assert!(live.exists);
        assert_eq!(live.native_id.as_deref(), Some("vpc-1"));
    }

    #[tokio::test]
    async fn test_not_found_is_not_an_error() {
        let mut query = MockQuery::new();
        query
            .expect_query()
            .times(1)
            .returning(|_, _| Ok(QueryOutcome::NotFound));

        let prober = Prober::new(query).with_policy(fast_policy());
        let live = prober.probe(&descriptor("network"), "x").await.unwrap();
        assert!(!live.exists);
        assert!(live.native_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let mut query = MockQuery::new();
        let mut calls = 0;
        query.expect_query().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(ProbeError::transient("Throttling"))
            } else {
                Ok(QueryOutcome::NotFound)
            }
        });

        let prober = Prober::new(query).with_policy(fast_policy());
        assert!(prober.probe(&descriptor("network"), "x").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_keep_provider_text() {
        let mut query = MockQuery::new();
        query
            .expect_query()
            .times(3)
            .returning(|_, _| Err(ProbeError::transient("ExpiredToken: session expired")));

        let prober = Prober::new(query).with_policy(fast_policy());
        let err = prober.probe(&descriptor("network"), "x").await.unwrap_err();
        assert_eq!(
            err,
            ProbeError::Failed {
                attempts: 3,
                last_error: String::from("ExpiredToken: session expired"),
            }
        );
    }

    #[tokio::test]
    async fn test_non_retryable_error_returned_immediately() {
        let mut query = MockQuery::new();
        query.expect_query().times(1).returning(|_, _| {
            Err(ProbeError::Failed {
                attempts: 0,
                last_error: String::from("no probe"),
            })
        });

        let prober = Prober::new(query).with_policy(fast_policy());
        assert!(prober.probe(&descriptor("network"), "x").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_become_failure_and_others_complete() {
        let params = TemplateParams {
            project: String::from("p"),
            environment: String::from("dev"),
            account: None,
            region: None,
        };
        let catalog = Catalog::new(
            vec![descriptor("a"), descriptor("x"), descriptor("b")],
            params,
        )
        .unwrap();

        let prober = Prober::new(HangingQuery { hang: "x" }).with_policy(fast_policy());
        let observed = prober.probe_all(&catalog).await;

        assert_eq!(observed.len(), 3);
        assert!(observed["a"].as_ref().unwrap().exists);
        assert!(observed["b"].as_ref().unwrap().exists);
        assert_eq!(
            observed["x"],
            Err(ProbeError::Failed {
                attempts: 3,
                last_error: String::from("Probe timed out after 30s"),
            })
        );
    }
}
