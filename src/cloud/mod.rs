//! Cloud provider access.
//!
//! This module handles everything that talks to a cloud provider:
//! - Running external CLIs through [`CommandRunner`]
//! - The [`CloudQuery`] interface the prober depends on
//! - `aws` and `az` implementations of it

mod aws;
mod azure;
mod query;
mod runner;

#[cfg(test)]
pub(crate) use runner::testing;

pub use aws::AwsCliQuery;
pub use azure::AzureCliQuery;
pub use query::{
    CloudQuery, QueryOutcome, STATE_ATTRIBUTE, classify_failure, is_not_found, unsupported,
};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner, command_line};

use crate::config::{CloudProvider, ProjectConfig};

/// Creates the CLI-backed query for the project's provider.
#[must_use]
pub fn query_for(project: &ProjectConfig) -> Box<dyn CloudQuery> {
    match project.provider {
        CloudProvider::Aws => Box::new(AwsCliQuery::new(project.region.clone())),
        CloudProvider::Azure => Box::new(AzureCliQuery::new(project.account.clone())),
    }
}
