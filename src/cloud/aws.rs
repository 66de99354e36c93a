//! AWS probes through the `aws` CLI.
//!
//! EC2 kinds accept either a native ID (`vpc-…`, `subnet-…`, `sg-…`, `i-…`)
//! or a `Name` tag; everything else is looked up by name or ARN. The CLI
//! picks up credentials the usual way (profile, environment, instance role).

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::debug;

use crate::catalog::ResourceKind;
use crate::config::CloudProvider;
use crate::error::ProbeError;

use super::query::{CloudQuery, QueryOutcome, STATE_ATTRIBUTE, classify_failure, unsupported};
use super::runner::{CommandRunner, ProcessRunner, command_line};

/// Instance states still worth reporting. `terminated` instances linger in
/// `describe-instances` for an hour and must not be imported.
const LIVE_INSTANCE_STATES: &str = "pending,running,stopping,stopped,shutting-down";

/// AWS query backed by the `aws` CLI.
#[derive(Debug, Clone)]
pub struct AwsCliQuery<R: CommandRunner = ProcessRunner> {
    runner: R,
    binary: String,
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VpcList {
    #[serde(default)]
    vpcs: Vec<Vpc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Vpc {
    vpc_id: String,
    state: Option<String>,
    cidr_block: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubnetList {
    #[serde(default)]
    subnets: Vec<Subnet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Subnet {
    subnet_id: String,
    state: Option<String>,
    vpc_id: Option<String>,
    cidr_block: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupList {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroup {
    group_id: String,
    vpc_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReservationList {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    state: Option<InstanceState>,
    instance_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceState {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyPairList {
    #[serde(default)]
    key_pairs: Vec<KeyPair>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyPair {
    key_name: String,
    key_pair_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetRole {
    role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Role {
    role_name: String,
    arn: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetInstanceProfile {
    instance_profile: InstanceProfile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceProfile {
    instance_profile_name: String,
    arn: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OidcProvider {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Secret {
    #[serde(rename = "ARN")]
    arn: String,
    name: Option<String>,
    deleted_date: Option<serde_json::Value>,
}

impl AwsCliQuery<ProcessRunner> {
    /// Creates a query that runs the real `aws` binary.
    #[must_use]
    pub fn new(region: Option<String>) -> Self {
        Self::with_runner(ProcessRunner::new(), region)
    }
}

impl<R: CommandRunner> AwsCliQuery<R> {
    /// Creates a query with a custom command runner.
    #[must_use]
    pub fn with_runner(runner: R, region: Option<String>) -> Self {
        Self {
            runner,
            binary: String::from("aws"),
            region,
        }
    }

    /// Builds the CLI arguments for a lookup, or `None` for unsupported kinds.
    fn arguments(&self, kind: ResourceKind, lookup: &str) -> Option<Vec<String>> {
        let by_name = |field: &str| format!("Name={field},Values={lookup}");

        let mut args: Vec<String> = match kind {
            ResourceKind::Network if lookup.starts_with("vpc-") => {
                vec!["ec2".into(), "describe-vpcs".into(), "--vpc-ids".into(), lookup.into()]
            }
            ResourceKind::Network => vec![
                "ec2".into(),
                "describe-vpcs".into(),
                "--filters".into(),
                by_name("tag:Name"),
            ],
            ResourceKind::Subnet if lookup.starts_with("subnet-") => vec![
                "ec2".into(),
                "describe-subnets".into(),
                "--subnet-ids".into(),
                lookup.into(),
            ],
            ResourceKind::Subnet => vec![
                "ec2".into(),
                "describe-subnets".into(),
                "--filters".into(),
                by_name("tag:Name"),
            ],
            ResourceKind::SecurityGroup if lookup.starts_with("sg-") => vec![
                "ec2".into(),
                "describe-security-groups".into(),
                "--group-ids".into(),
                lookup.into(),
            ],
            ResourceKind::SecurityGroup => vec![
                "ec2".into(),
                "describe-security-groups".into(),
                "--filters".into(),
                by_name("group-name"),
            ],
            ResourceKind::Compute if lookup.starts_with("i-") => vec![
                "ec2".into(),
                "describe-instances".into(),
                "--instance-ids".into(),
                lookup.into(),
            ],
            ResourceKind::Compute => vec![
                "ec2".into(),
                "describe-instances".into(),
                "--filters".into(),
                by_name("tag:Name"),
                format!("Name=instance-state-name,Values={LIVE_INSTANCE_STATES}"),
            ],
            ResourceKind::KeyPair => vec![
                "ec2".into(),
                "describe-key-pairs".into(),
                "--key-names".into(),
                lookup.into(),
            ],
            ResourceKind::Role => {
                vec!["iam".into(), "get-role".into(), "--role-name".into(), lookup.into()]
            }
            ResourceKind::InstanceProfile => vec![
                "iam".into(),
                "get-instance-profile".into(),
                "--instance-profile-name".into(),
                lookup.into(),
            ],
            ResourceKind::OidcProvider => vec![
                "iam".into(),
                "get-open-id-connect-provider".into(),
                "--open-id-connect-provider-arn".into(),
                lookup.into(),
            ],
            ResourceKind::Secret => vec![
                "secretsmanager".into(),
                "describe-secret".into(),
                "--secret-id".into(),
                lookup.into(),
            ],
            ResourceKind::Bucket => {
                vec!["s3api".into(), "head-bucket".into(), "--bucket".into(), lookup.into()]
            }
            ResourceKind::ResourceGroup | ResourceKind::Vault => return None,
        };

        args.extend(["--output".into(), "json".into()]);
        if let Some(region) = &self.region {
            args.extend(["--region".into(), region.clone()]);
        }
        Some(args)
    }
}

/// Parses CLI JSON output; a shape mismatch is treated as transient.
fn parse<T: DeserializeOwned>(stdout: &str) -> Result<T, ProbeError> {
    serde_json::from_str(stdout)
        .map_err(|e| ProbeError::transient(format!("unexpected aws output: {e}")))
}

fn found(native_id: String, attributes: &[(&str, Option<String>)]) -> QueryOutcome {
    QueryOutcome::Found {
        native_id,
        attributes: attributes
            .iter()
            .filter_map(|(k, v)| v.clone().map(|v| ((*k).to_string(), v)))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Picks the only match of a list lookup.
///
/// Several matches mean the lookup key does not identify one resource, which
/// only an operator can settle.
fn single<T>(
    kind: ResourceKind,
    lookup: &str,
    items: Vec<T>,
    id: impl Fn(&T) -> String,
) -> Result<Option<T>, ProbeError> {
    if items.len() > 1 {
        let ids: Vec<String> = items.iter().map(id).collect();
        return Err(ProbeError::Failed {
            attempts: 1,
            last_error: format!(
                "{kind} lookup '{lookup}' matches {} resources ({}); use the native ID as the template",
                ids.len(),
                ids.join(", ")
            ),
        });
    }
    Ok(items.into_iter().next())
}

/// Turns a successful response into an outcome. An empty list means absent.
fn interpret(kind: ResourceKind, lookup: &str, stdout: &str) -> Result<QueryOutcome, ProbeError> {
    let outcome = match kind {
        ResourceKind::Network => {
            let vpcs = parse::<VpcList>(stdout)?.vpcs;
            single(kind, lookup, vpcs, |v| v.vpc_id.clone())?.map(|v| {
                found(
                    v.vpc_id,
                    &[(STATE_ATTRIBUTE, v.state), ("cidr_block", v.cidr_block)],
                )
            })
        }
        ResourceKind::Subnet => {
            let subnets = parse::<SubnetList>(stdout)?.subnets;
            single(kind, lookup, subnets, |s| s.subnet_id.clone())?.map(|s| {
                found(
                    s.subnet_id,
                    &[
                        (STATE_ATTRIBUTE, s.state),
                        ("vpc_id", s.vpc_id),
                        ("cidr_block", s.cidr_block),
                    ],
                )
            })
        }
        ResourceKind::SecurityGroup => {
            let groups = parse::<SecurityGroupList>(stdout)?.security_groups;
            single(kind, lookup, groups, |g| g.group_id.clone())?
                .map(|g| found(g.group_id, &[("vpc_id", g.vpc_id)]))
        }
        ResourceKind::Compute => {
            let instances: Vec<Instance> = parse::<ReservationList>(stdout)?
                .reservations
                .into_iter()
                .flat_map(|r| r.instances)
                .collect();
            single(kind, lookup, instances, |i| i.instance_id.clone())?.map(|i| {
                found(
                    i.instance_id,
                    &[
                        (STATE_ATTRIBUTE, i.state.map(|s| s.name)),
                        ("instance_type", i.instance_type),
                    ],
                )
            })
        }
        ResourceKind::KeyPair => {
            let pairs = parse::<KeyPairList>(stdout)?.key_pairs;
            single(kind, lookup, pairs, |k| k.key_name.clone())?
                .map(|k| found(k.key_name, &[("key_pair_id", k.key_pair_id)]))
        }
        ResourceKind::Role => {
            let role = parse::<GetRole>(stdout)?.role;
            Some(found(role.role_name, &[("arn", role.arn)]))
        }
        ResourceKind::InstanceProfile => {
            let profile = parse::<GetInstanceProfile>(stdout)?.instance_profile;
            Some(found(profile.instance_profile_name, &[("arn", profile.arn)]))
        }
        ResourceKind::OidcProvider => {
            let provider = parse::<OidcProvider>(stdout)?;
            Some(found(lookup.to_string(), &[("url", provider.url)]))
        }
        ResourceKind::Secret => {
            let secret = parse::<Secret>(stdout)?;
            let state = secret.deleted_date.map(|_| String::from("deleting"));
            Some(found(secret.arn, &[("name", secret.name), (STATE_ATTRIBUTE, state)]))
        }
        ResourceKind::Bucket => Some(found(lookup.to_string(), &[])),
        ResourceKind::ResourceGroup | ResourceKind::Vault => {
            return Err(unsupported(CloudProvider::Aws, kind));
        }
    };

    Ok(outcome.unwrap_or(QueryOutcome::NotFound))
}

#[async_trait]
impl<R: CommandRunner> CloudQuery for AwsCliQuery<R> {
    async fn query(&self, kind: ResourceKind, lookup: &str) -> Result<QueryOutcome, ProbeError> {
        let args = self
            .arguments(kind, lookup)
            .ok_or_else(|| unsupported(CloudProvider::Aws, kind))?;

        debug!("Querying AWS {kind} '{lookup}'");
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
            return classify_failure(CloudProvider::Aws, kind, &output.stderr);
        }

        interpret(kind, lookup, &output.stdout)
    }

    fn provider(&self) -> CloudProvider {
        CloudProvider::Aws
    }
}
