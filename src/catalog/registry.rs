//! The resolved resource catalog.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::config::ConvergeConfig;
use crate::error::{ConfigError, Result};

use super::descriptor::ResourceDescriptor;
use super::graph::topological_order;
use super::template::TemplateParams;

/// An ordered, validated set of resource descriptors.
///
/// Construction fails on duplicate names, unknown or circular dependencies,
/// and templates that cannot be rendered. Once built the catalog is
/// immutable and every native ID lookup key is already resolved.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Descriptors in forward dependency order.
    descriptors: Vec<ResourceDescriptor>,
    /// Logical name to position in `descriptors`.
    index: HashMap<String, usize>,
    /// Rendered native ID lookup keys, parallel to `descriptors`.
    resolved: Vec<String>,
    params: TemplateParams,
}

impl Catalog {
    /// Builds a catalog from descriptors in declaration order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the descriptors are inconsistent.
    pub fn new(descriptors: Vec<ResourceDescriptor>, params: TemplateParams) -> Result<Self> {
        let mut seen = HashSet::with_capacity(descriptors.len());
        for d in &descriptors {
            if !seen.insert(d.logical_name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    name: d.logical_name.clone(),
                }
                .into());
            }
        }

        let order = topological_order(&descriptors)?;

        let mut slots: Vec<Option<ResourceDescriptor>> =
            descriptors.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(slots.len());
        for i in order {
            if let Some(d) = slots[i].take() {
                ordered.push(d);
            }
        }

        let resolved = ordered
            .iter()
            .map(|d| d.template.render(&params, &d.logical_name))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let index = ordered
            .iter()
            .enumerate()
            .map(|(i, d)| (d.logical_name.clone(), i))
            .collect();

        debug!("Catalog built with {} resources", ordered.len());

        Ok(Self {
            descriptors: ordered,
            index,
            resolved,
            params,
        })
    }

    /// Builds the catalog declared in a configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the declared resources are inconsistent.
    pub fn from_config(config: &ConvergeConfig) -> Result<Self> {
        let descriptors = config
            .resources
            .iter()
            .map(ResourceDescriptor::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(descriptors, config.template_params())
    }

    /// Looks up a descriptor by logical name.
    #[must_use]
    pub fn describe(&self, logical_name: &str) -> Option<&ResourceDescriptor> {
        self.index.get(logical_name).map(|&i| &self.descriptors[i])
    }

    /// Returns all descriptors in forward dependency order.
    #[must_use]
    pub fn all_descriptors(&self) -> &[ResourceDescriptor] {
        &self.descriptors
    }

    /// Returns descriptors in reverse dependency order.
    pub fn destroy_order(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.descriptors.iter().rev()
    }

    /// Returns the rendered native ID lookup key for a resource.
    #[must_use]
    pub fn resolved_id(&self, logical_name: &str) -> Option<&str> {
        self.index
            .get(logical_name)
            .map(|&i| self.resolved[i].as_str())
    }

    /// Returns the resources that directly depend on `logical_name`.
    #[must_use]
    pub fn dependents_of(&self, logical_name: &str) -> Vec<&str> {
        self.descriptors
            .iter()
            .filter(|d| d.depends_on.iter().any(|dep| dep == logical_name))
            .map(|d| d.logical_name.as_str())
            .collect()
    }

    /// Returns the template parameters the catalog was resolved with.
    #[must_use]
    pub const fn params(&self) -> &TemplateParams {
        &self.params
    }

    /// Returns the number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
