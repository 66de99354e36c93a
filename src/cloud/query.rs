//! Cloud provider query interface.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::catalog::ResourceKind;
use crate::config::CloudProvider;
use crate::error::ProbeError;

/// Attribute key holding the provider's lifecycle state, when it has one.
pub const STATE_ATTRIBUTE: &str = "state";

/// Result of a single lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The resource exists.
    Found {
        /// The provider's identifier, as the declarative engine imports it.
        native_id: String,
        /// Selected attributes from the provider response.
        attributes: BTreeMap<String, String>,
    },
    /// The provider says the resource does not exist.
    NotFound,
}

/// Answers "does this resource exist, and what is its native ID?".
///
/// Implementations perform exactly one provider call per `query`; retries
/// and deadlines belong to the prober.
#[async_trait]
pub trait CloudQuery: Send + Sync {
    /// Looks up a resource of `kind` by its rendered lookup key.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Transient`] for failures another attempt may
    /// fix, or [`ProbeError::Failed`] when the kind cannot be probed at all.
    async fn query(&self, kind: ResourceKind, lookup: &str) -> Result<QueryOutcome, ProbeError>;

    /// Returns the provider this implementation talks to.
    fn provider(&self) -> CloudProvider;
}

#[async_trait]
impl CloudQuery for Box<dyn CloudQuery> {
    async fn query(&self, kind: ResourceKind, lookup: &str) -> Result<QueryOutcome, ProbeError> {
        (**self).query(kind, lookup).await
    }

    fn provider(&self) -> CloudProvider {
        (**self).provider()
    }
}

/// Provider error codes that mean "this resource does not exist".
///
/// Matching is per kind: a generic "could not be found" also covers a missing
/// CLI profile or subscription, which must not read as an absent resource.
#[must_use]
pub const fn not_found_codes(provider: CloudProvider, kind: ResourceKind) -> &'static [&'static str] {
    match provider {
        CloudProvider::Aws => match kind {
            ResourceKind::Network => &["InvalidVpcID.NotFound"],
            ResourceKind::Subnet => &["InvalidSubnetID.NotFound"],
            ResourceKind::SecurityGroup => &["InvalidGroup.NotFound"],
            ResourceKind::Compute => &["InvalidInstanceID.NotFound"],
            ResourceKind::KeyPair => &["InvalidKeyPair.NotFound"],
            ResourceKind::Role | ResourceKind::InstanceProfile | ResourceKind::OidcProvider => {
                &["NoSuchEntity"]
            }
            ResourceKind::Secret => &["ResourceNotFoundException"],
            ResourceKind::Bucket => &["404", "NoSuchBucket"],
            ResourceKind::ResourceGroup | ResourceKind::Vault => &[],
        },
        CloudProvider::Azure => match kind {
            ResourceKind::ResourceGroup => &["ResourceGroupNotFound"],
            ResourceKind::Secret => &["SecretNotFound"],
            _ => &["ResourceNotFound", "ResourceGroupNotFound"],
        },
    }
}

/// Returns true if CLI stderr reports that the resource itself is missing.
///
/// Both CLIs print the error code in parentheses, e.g.
/// `An error occurred (NoSuchEntity) when calling ...` or
/// `(ResourceNotFound) The Resource ... was not found.`
#[must_use]
pub fn is_not_found(provider: CloudProvider, kind: ResourceKind, stderr: &str) -> bool {
    not_found_codes(provider, kind)
        .iter()
        .any(|code| stderr.contains(&format!("({code})")))
}

/// Maps a failed CLI call to a query outcome.
///
/// # Errors
///
/// Anything that is not a recognised "not found" for `kind` is transient,
/// with the provider's text kept verbatim.
pub fn classify_failure(
    provider: CloudProvider,
    kind: ResourceKind,
    stderr: &str,
) -> Result<QueryOutcome, ProbeError> {
    if is_not_found(provider, kind, stderr) {
        Ok(QueryOutcome::NotFound)
    } else {
        Err(ProbeError::transient(stderr.trim()))
    }
}

/// Error for a kind the provider has no probe for.
#[must_use]
pub fn unsupported(provider: CloudProvider, kind: ResourceKind) -> ProbeError {
    ProbeError::Failed {
        attempts: 0,
        last_error: format!("no {provider:?} probe for resource kind '{kind}'"),
    }
}
