//! Configuration module.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `converge.yaml`
//! - Applying environment overrides at the CLI boundary
//! - Validation of configuration values

mod spec;
mod parser;
mod validator;

pub use spec::{
    CloudProvider, ConvergeConfig, EngineConfig, ProbeConfig, ProjectConfig, ResourceSpec,
    StateBackend, StateConfig,
};
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, apply_overrides, find_config_file};
pub use validator::{ConfigValidator, MAX_PROBE_CONCURRENCY, ValidationError, ValidationResult};
