//! Configuration specification types.
//!
//! This module defines all the structs that map to the `converge.yaml` file.
//! The file declares the environment being reconciled, where the declarative
//! engine keeps its state, and the catalog of resources expected to exist.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::catalog::{ResourceKind, TemplateParams};

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConvergeConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// Tracked state location.
    #[serde(default)]
    pub state: StateConfig,
    /// Declarative engine invocation.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Live probe tuning.
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Resources expected to exist, in any order.
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Project name, used in native ID templates.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Cloud account (AWS account ID or Azure subscription ID).
    #[serde(default)]
    pub account: Option<String>,
    /// Cloud region.
    #[serde(default)]
    pub region: Option<String>,
    /// Cloud provider hosting the resources.
    #[serde(default)]
    pub provider: CloudProvider,
}

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    /// Amazon Web Services, probed through the `aws` CLI.
    #[default]
    Aws,
    /// Microsoft Azure, probed through the `az` CLI.
    Azure,
}

/// Tracked state location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StateConfig {
    /// Backend type (local or s3).
    #[serde(default)]
    pub backend: StateBackend,
    /// Local state file path (for local backend).
    #[serde(default)]
    pub path: Option<String>,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 object key (required for s3 backend).
    #[serde(default)]
    pub key: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// A `terraform.tfstate` file on disk.
    #[default]
    Local,
    /// The object written by Terraform's S3 backend.
    S3,
}

/// Declarative engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Engine binary (`terraform` or `tofu`).
    #[serde(default = "default_engine_binary")]
    pub binary: String,
    /// Directory holding the engine's root module.
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// Live probe tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Deadline for a single cloud call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per resource before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff between attempts, doubled on each retry.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Maximum probes in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// A single resource the environment is expected to contain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceSpec {
    /// Logical name, unique within the catalog.
    pub name: String,
    /// Resource kind, selects the probe.
    pub kind: ResourceKind,
    /// Native ID template (e.g. `"{project}-{environment}-vpc"`).
    pub native_id: String,
    /// Declarative engine address (defaults to the logical name).
    #[serde(default)]
    pub address: Option<String>,
    /// Logical names this resource depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

// Default value functions

fn default_environment() -> String {
    String::from("dev")
}

fn default_engine_binary() -> String {
    String::from("terraform")
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_ms() -> u64 {
    1000
}

const fn default_concurrency() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            working_dir: None,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            concurrency: default_concurrency(),
        }
    }
}

impl ConvergeConfig {
    /// Returns the fully qualified environment name.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Returns the parameters available to native ID templates.
    #[must_use]
    pub fn template_params(&self) -> TemplateParams {
        TemplateParams {
            project: self.project.name.clone(),
            environment: self.project.environment.clone(),
            account: self.project.account.clone(),
            region: self.project.region.clone(),
        }
    }

    /// Returns resource names in declaration order.
    #[must_use]
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }
}

impl ProbeConfig {
    /// Per-call deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base backoff delay.
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl ResourceSpec {
    /// Returns the engine address, falling back to the logical name.
    #[must_use]
    pub fn engine_address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.name)
    }
}
