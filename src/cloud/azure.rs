//! Azure probes through the `az` CLI.
//!
//! Azure resources are addressed by their full ARM ID, which is also what
//! `azurerm` resources use as their Terraform ID. Resource groups may be
//! given by bare name; secrets use `<vault-name>/<secret-name>`.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::catalog::ResourceKind;
use crate::config::CloudProvider;
use crate::error::ProbeError;

use super::query::{CloudQuery, QueryOutcome, STATE_ATTRIBUTE, classify_failure, unsupported};
use super::runner::{CommandRunner, ProcessRunner, command_line};

/// Azure query backed by the `az` CLI.
#[derive(Debug, Clone)]
pub struct AzureCliQuery<R: CommandRunner = ProcessRunner> {
    runner: R,
    binary: String,
    subscription: Option<String>,
}

/// The subset of an ARM resource the probe reads.
#[derive(Debug, Deserialize)]
struct ArmResource {
    id: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    properties: Option<ArmProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmProperties {
    #[serde(default)]
    provisioning_state: Option<String>,
}

impl AzureCliQuery<ProcessRunner> {
    /// Creates a query that runs the real `az` binary.
    #[must_use]
    pub fn new(subscription: Option<String>) -> Self {
        Self::with_runner(ProcessRunner::new(), subscription)
    }
}

impl<R: CommandRunner> AzureCliQuery<R> {
    /// Creates a query with a custom command runner.
    #[must_use]
    pub fn with_runner(runner: R, subscription: Option<String>) -> Self {
        Self {
            runner,
            binary: String::from("az"),
            subscription,
        }
    }

    fn arguments(&self, kind: ResourceKind, lookup: &str) -> Result<Vec<String>, ProbeError> {
        let mut args: Vec<String> = match kind {
            ResourceKind::ResourceGroup if !lookup.starts_with('/') => {
                vec!["group".into(), "show".into(), "--name".into(), lookup.into()]
            }
            ResourceKind::Secret => {
                let (vault, name) = lookup.split_once('/').ok_or_else(|| ProbeError::Failed {
                    attempts: 0,
                    last_error: format!("secret lookup '{lookup}' must be '<vault>/<secret>'"),
                })?;
                vec![
                    "keyvault".into(),
                    "secret".into(),
                    "show".into(),
                    "--vault-name".into(),
                    vault.into(),
                    "--name".into(),
                    name.into(),
                ]
            }
            ResourceKind::InstanceProfile | ResourceKind::OidcProvider => {
                return Err(unsupported(CloudProvider::Azure, kind));
            }
            _ => vec!["resource".into(), "show".into(), "--ids".into(), lookup.into()],
        };

        args.extend(["--output".into(), "json".into()]);
        if let Some(subscription) = &self.subscription {
            args.extend(["--subscription".into(), subscription.clone()]);
        }
        Ok(args)
    }
}

#[async_trait]
impl<R: CommandRunner> CloudQuery for AzureCliQuery<R> {
    async fn query(&self, kind: ResourceKind, lookup: &str) -> Result<QueryOutcome, ProbeError> {
        let args = self.arguments(kind, lookup)?;

        debug!("Querying Azure {kind} '{lookup}'");
        let output = self
            .runner
            .run(&self.binary, &args, None)
            .await
            .map_err(|e| {
                ProbeError::transient(format!(
                    "failed to run `{}`: {e}",
                    command_line(&self.binary, &args)
                ))
            })?;

        if !output.success {
            return classify_failure(CloudProvider::Azure, kind, &output.stderr);
        }

        // `az` prints nothing for some empty results.
        if output.stdout.trim().is_empty() {
            return Ok(QueryOutcome::NotFound);
        }

        let resource: ArmResource = serde_json::from_str(&output.stdout)
            .map_err(|e| ProbeError::transient(format!("unexpected az output: {e}")))?;

        let mut attributes = BTreeMap::new();
        if let Some(state) = resource.properties.and_then(|p| p.provisioning_state) {
            attributes.insert(STATE_ATTRIBUTE.to_string(), state);
        }
        if let Some(location) = resource.location {
            attributes.insert(String::from("location"), location);
        }

        Ok(QueryOutcome::Found {
            native_id: resource.id,
            attributes,
        })
    }

    fn provider(&self) -> CloudProvider {
        CloudProvider::Azure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::runner::CommandOutput;
    use crate::cloud::runner::testing::ScriptedRunner;

    fn query(responses: Vec<CommandOutput>) -> AzureCliQuery<ScriptedRunner> {
        AzureCliQuery::with_runner(ScriptedRunner::with_responses(responses), None)
    }

    #[tokio::test]
    async fn test_resource_group_by_name() {
        let q = query(vec![CommandOutput::ok(
            r#"{"id":"/subscriptions/s/resourceGroups/runners-dev-rg","location":"westeurope",
                "properties":{"provisioningState":"Succeeded"}}"#,
        )]);
        let outcome = q.query(ResourceKind::ResourceGroup, "runners-dev-rg").await.unwrap();
        let QueryOutcome::Found { native_id, attributes } = outcome else {
            panic!("expected resource group");
        };
        assert_eq!(native_id, "/subscriptions/s/resourceGroups/runners-dev-rg");
        assert_eq!(attributes.get("state").map(String::as_str), Some("Succeeded"));
        assert_eq!(
            q.runner.executed_commands(),
            vec!["az group show --name runners-dev-rg --output json"]
        );
    }

    #[tokio::test]
    async fn test_resource_not_found() {
        let q = query(vec![CommandOutput::failed(
            "(ResourceNotFound) The Resource 'Microsoft.Compute/virtualMachines/vm' under \
             resource group 'rg' was not found.",
        )]);
        let outcome = q
            .query(
                ResourceKind::Compute,
                "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm",
            )
            .await
            .unwrap();
        assert_eq!(outcome, QueryOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_secret_lookup_requires_vault() {
        let q = query(vec![]);
        let err = q.query(ResourceKind::Secret, "no-slash").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_secret_lookup_command() {
        let q = AzureCliQuery::with_runner(
            ScriptedRunner::with_responses(vec![CommandOutput::ok(
                r#"{"id":"https://kv.vault.azure.net/secrets/gh-token/abc"}"#,
            )]),
            Some(String::from("sub-1")),
        );
        let outcome = q.query(ResourceKind::Secret, "kv/gh-token").await.unwrap();
        assert!(matches!(outcome, QueryOutcome::Found { .. }));
        assert_eq!(
            q.runner.executed_commands(),
            vec![
                "az keyvault secret show --vault-name kv --name gh-token --output json \
                 --subscription sub-1"
            ]
        );
    }
}
