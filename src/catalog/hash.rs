//! Catalog fingerprinting.
//!
//! A plan records the hash of the catalog it was computed from, so two plans
//! can be compared and an operator can tell whether the catalog changed
//! between `plan` and `apply`.

use sha2::{Digest, Sha256};

use super::descriptor::ResourceDescriptor;
use super::registry::Catalog;

/// Hasher for computing catalog fingerprints.
#[derive(Debug, Default)]
pub struct CatalogHasher;

impl CatalogHasher {
    /// Creates a new catalog hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the whole resolved catalog.
    ///
    /// Descriptors are hashed in dependency order, so reordering the
    /// configuration file without changing dependencies may change the hash.
    #[must_use]
    pub fn hash_catalog(&self, catalog: &Catalog) -> String {
        let mut hasher = Sha256::new();

        let params = catalog.params();
        hasher.update(params.project.as_bytes());
        hasher.update(params.environment.as_bytes());
        if let Some(account) = &params.account {
            hasher.update(account.as_bytes());
        }
        if let Some(region) = &params.region {
            hasher.update(region.as_bytes());
        }

        for descriptor in catalog.all_descriptors() {
            hasher.update(self.hash_descriptor(descriptor).as_bytes());
            if let Some(id) = catalog.resolved_id(&descriptor.logical_name) {
                hasher.update(id.as_bytes());
            }
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single descriptor.
    #[must_use]
    pub fn hash_descriptor(&self, descriptor: &ResourceDescriptor) -> String {
        let mut hasher = Sha256::new();

        hasher.update(descriptor.logical_name.as_bytes());
        hasher.update(descriptor.kind.as_str().as_bytes());
        hasher.update(descriptor.template.as_str().as_bytes());
        hasher.update(descriptor.address.as_bytes());

        // Dependencies (sorted for determinism)
        let mut deps: Vec<_> = descriptor.depends_on.iter().collect();
        deps.sort();
        for dep in deps {
            hasher.update(dep.as_bytes());
            hasher.update([0u8]);
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}
