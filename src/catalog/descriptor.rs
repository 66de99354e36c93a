//! Resource descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ResourceSpec;
use crate::error::ConfigError;

use super::template::NativeIdTemplate;

/// Kind of cloud resource. Selects the probe used for a descriptor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Azure resource group.
    ResourceGroup,
    /// VPC or virtual network.
    Network,
    /// Subnet.
    Subnet,
    /// Security group or network security group.
    SecurityGroup,
    /// IAM role.
    Role,
    /// IAM instance profile.
    InstanceProfile,
    /// OIDC identity provider.
    OidcProvider,
    /// Key vault.
    Vault,
    /// Secret in a secrets manager or key vault.
    Secret,
    /// Virtual machine or EC2 instance.
    Compute,
    /// Object storage bucket or storage account.
    Bucket,
    /// SSH key pair.
    KeyPair,
}

impl ResourceKind {
    /// Returns true if the `aws` CLI probe knows this kind.
    #[must_use]
    pub const fn supported_on_aws(self) -> bool {
        !matches!(self, Self::ResourceGroup | Self::Vault)
    }

    /// Returns true if the `az` CLI probe knows this kind.
    #[must_use]
    pub const fn supported_on_azure(self) -> bool {
        !matches!(self, Self::InstanceProfile | Self::OidcProvider)
    }

    /// Returns the configuration spelling of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResourceGroup => "resource_group",
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::SecurityGroup => "security_group",
            Self::Role => "role",
            Self::InstanceProfile => "instance_profile",
            Self::OidcProvider => "oidc_provider",
            Self::Vault => "vault",
            Self::Secret => "secret",
            Self::Compute => "compute",
            Self::Bucket => "bucket",
            Self::KeyPair => "key_pair",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource the environment is expected to contain.
///
/// Descriptors are immutable once the catalog is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Unique logical name.
    pub logical_name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Template the native ID lookup key is rendered from.
    pub template: NativeIdTemplate,
    /// Declarative engine address.
    pub address: String,
    /// Logical names that must exist first, in declaration order.
    pub depends_on: Vec<String>,
}

impl ResourceDescriptor {
    /// Creates a descriptor whose engine address is its logical name.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not parse.
    pub fn new(
        logical_name: impl Into<String>,
        kind: ResourceKind,
        template: &str,
    ) -> Result<Self, ConfigError> {
        let logical_name = logical_name.into();
        Ok(Self {
            address: logical_name.clone(),
            logical_name,
            kind,
            template: NativeIdTemplate::parse(template)?,
            depends_on: Vec::new(),
        })
    }

    /// Sets the engine address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }
}

impl TryFrom<&ResourceSpec> for ResourceDescriptor {
    type Error = ConfigError;

    fn try_from(spec: &ResourceSpec) -> Result<Self, Self::Error> {
        Ok(Self {
            logical_name: spec.name.clone(),
            kind: spec.kind,
            template: NativeIdTemplate::parse(&spec.native_id)?,
            address: spec.engine_address().to_string(),
            depends_on: spec.depends_on.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_spelling() {
        let kind: ResourceKind = serde_yaml::from_str("oidc_provider").unwrap();
        assert_eq!(kind, ResourceKind::OidcProvider);
        assert_eq!(kind.to_string(), "oidc_provider");
    }

    #[test]
    fn test_builder() {
        let d = ResourceDescriptor::new("subnet", ResourceKind::Subnet, "{project}-subnet")
            .unwrap()
            .with_address("aws_subnet.public")
            .depends_on("network");
        assert_eq!(d.address, "aws_subnet.public");
        assert_eq!(d.depends_on, vec![String::from("network")]);
    }
}
