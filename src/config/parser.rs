//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables. It is the only place in the crate that reads the process
//! environment; everything downstream receives immutable structs.

use crate::error::{ConfigError, ConvergeError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::{ConvergeConfig, StateBackend};

/// Configuration parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ConvergeConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConvergeError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvergeError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ConvergeConfig> {
        debug!("Parsing YAML configuration");

        let config: ConvergeConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ConvergeError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration for {}/{} with {} resources",
            config.project.name,
            config.project.environment,
            config.resources.len()
        );
        Ok(config)
    }

    /// Loads configuration with process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ConvergeConfig> {
        let mut config = self.load_file(path)?;
        apply_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ConvergeError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Applies environment overrides through `lookup`.
///
/// Recognised variables are `CONVERGE_PROJECT_{NAME,ENVIRONMENT,ACCOUNT,REGION}`
/// and the Terraform backend variables `TF_BACKEND_{BUCKET,KEY,REGION}`. Setting
/// `TF_BACKEND_BUCKET` switches the state backend to S3.
pub fn apply_overrides<F>(config: &mut ConvergeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(name) = lookup("CONVERGE_PROJECT_NAME") {
        debug!("Overriding project.name from environment");
        config.project.name = name;
    }

    if let Some(env) = lookup("CONVERGE_PROJECT_ENVIRONMENT") {
        debug!("Overriding project.environment from environment");
        config.project.environment = env;
    }

    if let Some(account) = lookup("CONVERGE_PROJECT_ACCOUNT") {
        debug!("Overriding project.account from environment");
        config.project.account = Some(account);
    }

    if let Some(region) = lookup("CONVERGE_PROJECT_REGION") {
        debug!("Overriding project.region from environment");
        config.project.region = Some(region);
    }

    if let Some(bucket) = lookup("TF_BACKEND_BUCKET") {
        debug!("Overriding state.bucket from environment");
        config.state.backend = StateBackend::S3;
        config.state.bucket = Some(bucket);
    }

    if let Some(key) = lookup("TF_BACKEND_KEY") {
        debug!("Overriding state.key from environment");
        config.state.key = Some(key);
    }

    if let Some(region) = lookup("TF_BACKEND_REGION") {
        debug!("Overriding state.region from environment");
        config.state.region = Some(region);
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["converge.yaml", "converge.yml", ".converge.yaml"];

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConvergeError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResourceKind;
    use crate::config::CloudProvider;
    use std::collections::HashMap;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
project:
  name: runners
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(config.project.name, "runners");
        assert_eq!(config.project.environment, "dev");
        assert_eq!(config.project.provider, CloudProvider::Aws);
        assert_eq!(config.state.backend, StateBackend::Local);
        assert_eq!(config.engine.binary, "terraform");
        assert!(config.resources.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
project:
  name: runners
  environment: prod
  account: "123456789012"
  region: us-east-1

state:
  backend: s3
  bucket: runners-tf-state
  key: runners/prod/terraform.tfstate

engine:
  binary: tofu
  working_dir: infra/aws

probe:
  timeout_secs: 10
  concurrency: 8

resources:
  - name: network
    kind: network
    native_id: "{project}-{environment}-vpc"
    address: aws_vpc.main
  - name: subnet
    kind: subnet
    native_id: "{project}-{environment}-subnet"
    address: aws_subnet.public
    depends_on: [network]
"#;
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(config.state.backend, StateBackend::S3);
        assert_eq!(config.engine.binary, "tofu");
        assert_eq!(config.probe.timeout_secs, 10);
        assert_eq!(config.probe.max_attempts, 3);
        assert_eq!(config.resources.len(), 2);
        assert_eq!(config.resources[1].kind, ResourceKind::Subnet);
        assert_eq!(config.resources[1].depends_on, vec![String::from("network")]);
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let yaml = r#"
project:
  name: runners
resources:
  - name: thing
    kind: spaceship
    native_id: "x"
"#;
        let err = ConfigParser::new().parse_yaml(yaml, None).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_backend_overrides() {
        let mut config = ConfigParser::new()
            .parse_yaml("project:\n  name: runners\n", None)
            .unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            ("TF_BACKEND_BUCKET", "tf-state"),
            ("TF_BACKEND_KEY", "runners.tfstate"),
            ("CONVERGE_PROJECT_ENVIRONMENT", "staging"),
        ]);
        apply_overrides(&mut config, |k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.state.backend, StateBackend::S3);
        assert_eq!(config.state.bucket.as_deref(), Some("tf-state"));
        assert_eq!(config.state.key.as_deref(), Some("runners.tfstate"));
        assert_eq!(config.project.environment, "staging");
        assert_eq!(config.project.name, "runners");
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("converge.yaml"), "project:\n  name: x\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("converge.yaml"));
    }
}
