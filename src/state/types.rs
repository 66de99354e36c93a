//! Tracked state types.
//!
//! The tracked state is whatever the declarative engine has recorded.
//! It is read from Terraform's own state file (format version 4) and never
//! written by this crate.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use crate::catalog::Catalog;
use crate::error::{ConvergeError, Result, StateError};

/// Supported Terraform state format version.
pub const STATE_VERSION: u64 = 4;

/// Raw Terraform state document. Only the fields we read are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct TerraformState {
    /// Format version.
    pub version: u64,
    /// Terraform version that wrote the state.
    #[serde(default)]
    pub terraform_version: Option<String>,
    /// Monotonic write counter.
    #[serde(default)]
    pub serial: Option<u64>,
    /// State lineage identifier.
    #[serde(default)]
    pub lineage: Option<String>,
    /// Recorded resources.
    #[serde(default)]
    pub resources: Vec<TerraformResource>,
}

/// A resource block in the state file.
#[derive(Debug, Clone, Deserialize)]
pub struct TerraformResource {
    /// Module path, e.g. `module.network`. Absent for the root module.
    #[serde(default)]
    pub module: Option<String>,
    /// `managed` or `data`.
    pub mode: String,
    /// Resource type, e.g. `aws_vpc`.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource name, e.g. `main`.
    pub name: String,
    /// One entry per `count`/`for_each` instance.
    #[serde(default)]
    pub instances: Vec<TerraformInstance>,
}

/// A single resource instance.
#[derive(Debug, Clone, Deserialize)]
pub struct TerraformInstance {
    /// `count` index or `for_each` key.
    #[serde(default)]
    pub index_key: Option<serde_json::Value>,
    /// Provider attributes.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// What the engine recorded for one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedInstance {
    /// Full engine address.
    pub address: String,
    /// Recorded native ID (`attributes.id`).
    pub native_id: String,
    /// All recorded attributes.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Tracked state for one catalog resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedResourceState {
    /// Logical name from the catalog.
    pub logical_name: String,
    /// Engine address it was found under.
    pub address: String,
    /// Recorded native ID.
    pub native_id: String,
    /// Recorded attributes.
    pub last_known_attributes: BTreeMap<String, serde_json::Value>,
}

/// Tracked state keyed by logical name. Absent means untracked.
pub type TrackedMap = HashMap<String, TrackedResourceState>;

/// Every managed instance in a state file, keyed by address.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackedState {
    /// Terraform version that wrote the state.
    pub terraform_version: Option<String>,
    /// State serial.
    pub serial: Option<u64>,
    /// Instances by address.
    pub instances: BTreeMap<String, TrackedInstance>,
}

impl TrackedState {
    /// Parses a Terraform state document.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Corrupted`] for malformed JSON or an instance
    /// without a string `attributes.id`, and
    /// [`StateError::UnsupportedVersion`] for anything but version 4.
    pub fn parse(raw: &str) -> Result<Self> {
        let state: TerraformState = serde_json::from_str(raw)
            .map_err(|e| StateError::corrupted(format!("Failed to parse state: {e}")))?;

        if state.version != STATE_VERSION {
            return Err(ConvergeError::State(StateError::UnsupportedVersion {
                found: state.version,
                supported: STATE_VERSION,
            }));
        }

        let mut instances = BTreeMap::new();
        for resource in state.resources.iter().filter(|r| r.mode == "managed") {
            for instance in &resource.instances {
                let address = instance_address(resource, instance.index_key.as_ref());
                let native_id = instance
                    .attributes
                    .get("id")
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| {
                        StateError::corrupted(format!("'{address}' has no attributes.id"))
                    })?
                    .to_string();

                instances.insert(
                    address.clone(),
                    TrackedInstance {
                        address,
                        native_id,
                        attributes: instance
                            .attributes
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                    },
                );
            }
        }

        Ok(Self {
            terraform_version: state.terraform_version,
            serial: state.serial,
            instances,
        })
    }

    /// Looks up an instance by engine address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&TrackedInstance> {
        self.instances.get(address)
    }

    /// Returns all tracked addresses, sorted.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    /// Returns the number of tracked instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Maps catalog resources to what the engine recorded for their addresses.
    #[must_use]
    pub fn for_catalog(&self, catalog: &Catalog) -> TrackedMap {
        catalog
            .all_descriptors()
            .iter()
            .filter_map(|d| {
                self.get(&d.address).map(|i| {
                    (
                        d.logical_name.clone(),
                        TrackedResourceState {
                            logical_name: d.logical_name.clone(),
                            address: i.address.clone(),
                            native_id: i.native_id.clone(),
                            last_known_attributes: i.attributes.clone(),
                        },
                    )
                })
            })
            .collect()
    }

    /// Returns tracked addresses that no catalog resource claims.
    #[must_use]
    pub fn unclaimed(&self, catalog: &Catalog) -> Vec<&str> {
        self.addresses()
            .filter(|a| !catalog.all_descriptors().iter().any(|d| d.address == *a))
            .collect()
    }
}

/// Formats an instance address the way `terraform state list` prints it.
fn instance_address(resource: &TerraformResource, index_key: Option<&serde_json::Value>) -> String {
    let mut address = String::new();
    if let Some(module) = &resource.module {
        address.push_str(module);
        address.push('.');
    }
    address.push_str(&resource.resource_type);
    address.push('.');
    address.push_str(&resource.name);

    match index_key {
        Some(serde_json::Value::Number(n)) => {
            let _ = write!(address, "[{n}]");
        }
        Some(serde_json::Value::String(s)) => {
            let _ = write!(address, "[\"{s}\"]");
        }
        _ => {}
    }
    address
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATE: &str = r#"{
      "version": 4,
      "terraform_version": "1.9.5",
      "serial": 12,
      "lineage": "3f1c",
      "resources": [
        {"mode": "managed", "type": "aws_vpc", "name": "main", "provider": "aws",
         "instances": [{"schema_version": 1, "attributes": {"id": "vpc-123", "cidr_block": "10.0.0.0/16"}}]},
        {"mode": "data", "type": "aws_ami", "name": "ubuntu",
         "instances": [{"attributes": {"id": "ami-1"}}]},
        {"module": "module.runners", "mode": "managed", "type": "aws_instance", "name": "runner",
         "instances": [
           {"index_key": 0, "attributes": {"id": "i-0"}},
           {"index_key": 1, "attributes": {"id": "i-1"}}
         ]},
        {"mode": "managed", "type": "aws_secretsmanager_secret", "name": "token",
         "instances": [{"index_key": "github", "attributes": {"id": "arn:secret"}}]}
      ]
    }"#;

    #[test]
    fn test_parse_addresses() {
        let state = TrackedState::parse(STATE).unwrap();
        let addresses: Vec<_> = state.addresses().collect();
        assert_eq!(
            addresses,
            vec![
                "aws_secretsmanager_secret.token[\"github\"]",
                "aws_vpc.main",
                "module.runners.aws_instance.runner[0]",
                "module.runners.aws_instance.runner[1]",
            ]
        );
        assert_eq!(state.get("aws_vpc.main").unwrap().native_id, "vpc-123");
        assert_eq!(state.serial, Some(12));
    }

    #[test]
    fn test_unsupported_version() {
        let err = TrackedState::parse(r#"{"version": 3, "resources": []}"#).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("version 3"));
    }

    #[test]
    fn test_malformed_json() {
        let err = TrackedState::parse("{not json").unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_missing_id_is_corruption() {
        let raw = r#"{"version": 4, "resources": [
            {"mode": "managed", "type": "aws_vpc", "name": "main",
             "instances": [{"attributes": {"cidr_block": "10.0.0.0/16"}}]}]}"#;
        let err = TrackedState::parse(raw).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("aws_vpc.main"));
    }
}
