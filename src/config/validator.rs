//! Configuration validation.
//!
//! Validation collects every problem it finds instead of stopping at the
//! first one, so `converge validate` can show the operator the whole list.
//! Structural catalog checks (cycles, rendering) are repeated by
//! [`crate::catalog::Catalog::new`]; this pass adds field-level checks and
//! warnings that the catalog does not care about.

use serde::Serialize;

use crate::catalog::{NativeIdTemplate, Placeholder, ResourceKind};
use crate::error::{ConfigError, ConvergeError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{
    CloudProvider, ConvergeConfig, ProbeConfig, ProjectConfig, ResourceSpec, StateBackend,
    StateConfig,
};

/// Upper bound on concurrent probes.
pub const MAX_PROBE_CONCURRENCY: usize = 8;

/// Validator for convergence configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug, Serialize)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, config: &ConvergeConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(ConvergeError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Runs every check and returns the full result without failing.
    #[must_use]
    pub fn check(&self, config: &ConvergeConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_state(&config.state, &mut result);
        Self::validate_probe(&config.probe, &mut result);

        if config.engine.binary.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("engine.binary"),
                message: String::from("Engine binary cannot be empty"),
            });
        }

        Self::validate_resources(config, &mut result);
        result
    }

    fn validate_project(project: &ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: String::from("Project name cannot be empty"),
            });
        } else if !is_valid_name(&project.name) {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            });
        }

        if project.environment.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.environment"),
                message: String::from("Environment cannot be empty"),
            });
        }

        if project.provider == CloudProvider::Azure && project.account.is_none() {
            result.warnings.push(String::from(
                "project.account: Azure resource IDs usually need the subscription ID",
            ));
        }
    }

    fn validate_state(state: &StateConfig, result: &mut ValidationResult) {
        match state.backend {
            StateBackend::S3 => {
                if state.bucket.as_ref().is_none_or(String::is_empty) {
                    result.errors.push(ValidationError {
                        field: String::from("state.bucket"),
                        message: String::from("S3 bucket name is required when using S3 backend"),
                    });
                }
                if state.key.as_ref().is_none_or(String::is_empty) {
                    result.errors.push(ValidationError {
                        field: String::from("state.key"),
                        message: String::from("S3 object key is required when using S3 backend"),
                    });
                }
            }
            StateBackend::Local => {
                if state.bucket.is_some() {
                    result.warnings.push(String::from(
                        "state.bucket: Ignored because the backend is local",
                    ));
                }
            }
        }
    }

    fn validate_probe(probe: &ProbeConfig, result: &mut ValidationResult) {
        if probe.timeout_secs == 0 {
            result.errors.push(ValidationError {
                field: String::from("probe.timeout_secs"),
                message: String::from("Probe timeout must be at least 1 second"),
            });
        }

        if probe.max_attempts == 0 {
            result.errors.push(ValidationError {
                field: String::from("probe.max_attempts"),
                message: String::from("Probe attempts must be at least 1"),
            });
        }

        if probe.concurrency == 0 {
            result.errors.push(ValidationError {
                field: String::from("probe.concurrency"),
                message: String::from("Probe concurrency must be at least 1"),
            });
        } else if probe.concurrency > MAX_PROBE_CONCURRENCY {
            result.warnings.push(format!(
                "probe.concurrency: {} exceeds the maximum and will be clamped to {MAX_PROBE_CONCURRENCY}",
                probe.concurrency
            ));
        }
    }

    fn validate_resources(config: &ConvergeConfig, result: &mut ValidationResult) {
        let resources = &config.resources;
        if resources.is_empty() {
            result.warnings.push(String::from("No resources defined in configuration"));
            return;
        }

        let names: HashSet<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        let mut seen_names = HashSet::new();
        let mut seen_addresses = HashSet::new();

        for (i, resource) in resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");

            if !seen_names.insert(resource.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!("Duplicate resource name: {}", resource.name),
                });
            }

            if !is_valid_resource_name(&resource.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Resource name '{}' is invalid. Must be lowercase alphanumeric with hyphens or underscores.",
                        resource.name
                    ),
                });
            }

            if !seen_addresses.insert(resource.engine_address()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.address"),
                    message: format!("Engine address '{}' is used twice", resource.engine_address()),
                });
            }

            if resource.address.as_deref().is_some_and(|a| !a.contains('.')) {
                result.warnings.push(format!(
                    "{prefix}.address: '{}' does not look like a Terraform address (type.name)",
                    resource.engine_address()
                ));
            }

            Self::validate_template(config, resource, &prefix, result);
            Self::validate_kind(config.project.provider, resource, &prefix, result);

            for dep in &resource.depends_on {
                if dep == &resource.name {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.depends_on"),
                        message: format!("Resource '{}' depends on itself", resource.name),
                    });
                } else if !names.contains(dep.as_str()) {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.depends_on"),
                        message: format!(
                            "Resource '{}' depends on unknown resource '{dep}'",
                            resource.name
                        ),
                    });
                }
            }
        }
    }

    fn validate_template(
        config: &ConvergeConfig,
        resource: &ResourceSpec,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        let template = match NativeIdTemplate::parse(&resource.native_id) {
            Ok(t) => t,
            Err(e) => {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.native_id"),
                    message: e.to_string(),
                });
                return;
            }
        };

        for placeholder in template.placeholders() {
            let missing = match placeholder {
                Placeholder::Account => config.project.account.is_none().then_some("project.account"),
                Placeholder::Region => config.project.region.is_none().then_some("project.region"),
                _ => None,
            };
            if let Some(field) = missing {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.native_id"),
                    message: format!(
                        "Template '{}' needs {field}, which is not set",
                        resource.native_id
                    ),
                });
            }
        }
    }

    fn validate_kind(
        provider: CloudProvider,
        resource: &ResourceSpec,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        let supported = match provider {
            CloudProvider::Aws => resource.kind.supported_on_aws(),
            CloudProvider::Azure => resource.kind.supported_on_azure(),
        };
        if !supported {
            result.warnings.push(format!(
                "{prefix}.kind: '{}' has no {provider:?} probe; it will always be reported as a probe failure",
                resource.kind
            ));
        }

        if provider == CloudProvider::Azure
            && resource.kind != ResourceKind::ResourceGroup
            && resource.kind != ResourceKind::Secret
            && !resource.native_id.starts_with("/subscriptions/")
        {
            result.warnings.push(format!(
                "{prefix}.native_id: Azure resources are looked up by full resource ID (/subscriptions/...)"
            ));
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    if !chars.next().is_some_and(|c| c.is_ascii_lowercase()) {
        return false;
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

/// Resource names additionally allow underscores, matching Terraform labels.
fn is_valid_resource_name(name: &str) -> bool {
    let mut chars = name.chars();

    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> ConvergeConfig {
        ConfigParser::new().parse_yaml(yaml, None).unwrap()
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("runners"));
        assert!(is_valid_name("ci-runners-2"));
        assert!(is_valid_resource_name("runner_vm"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Runners"));
        assert!(!is_valid_name("1runners"));
        assert!(!is_valid_name("run_ners"));
        assert!(!is_valid_name("runners-"));
        assert!(!is_valid_name("run--ners"));
        assert!(!is_valid_resource_name("_vm"));
    }

    #[test]
    fn test_s3_backend_requires_bucket_and_key() {
        let config = parse("project:\n  name: runners\nstate:\n  backend: s3\n");
        let result = ConfigValidator::new().check(&config);
        let fields: Vec<_> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"state.bucket"));
        assert!(fields.contains(&"state.key"));
    }

    #[test]
    fn test_account_placeholder_without_account() {
        let config = parse(
            r#"
project:
  name: runners
resources:
  - name: oidc
    kind: oidc_provider
    native_id: "arn:aws:iam::{account}:oidc-provider/token.actions.githubusercontent.com"
"#,
        );
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(err.to_string().contains("project.account"));
    }

    #[test]
    fn test_unknown_dependency_and_duplicates() {
        let config = parse(
            r#"
project:
  name: runners
resources:
  - name: vm
    kind: compute
    native_id: "{project}-vm"
    depends_on: [subnet]
  - name: vm
    kind: compute
    native_id: "{project}-vm2"
    address: aws_instance.other
"#,
        );
        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.error_count(), 2);
    }

    #[test]
    fn test_concurrency_clamp_warning() {
        let config = parse(
            r#"
project:
  name: runners
probe:
  concurrency: 32
resources:
  - name: network
    kind: network
    native_id: "{project}-{environment}-vpc"
    address: aws_vpc.main
"#,
        );
        let result = ConfigValidator::new().validate(&config).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
    }
}
