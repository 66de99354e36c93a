//! Terraform (or OpenTofu) CLI engine.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cloud::{CommandOutput, CommandRunner, ProcessRunner, command_line};
use crate::config::EngineConfig;
use crate::error::EngineError;

use super::DeclarativeEngine;

/// Printed by `terraform state list` when there is no state yet.
const NO_STATE: &str = "No state file was found";

/// Drives the `terraform` binary in a working directory.
#[derive(Debug, Clone)]
pub struct TerraformEngine<R: CommandRunner = ProcessRunner> {
    runner: R,
    binary: String,
    working_dir: Option<PathBuf>,
}

impl TerraformEngine<ProcessRunner> {
    /// Creates an engine from the `engine:` configuration section.
    ///
    /// A relative `working_dir` resolves against `base_dir`.
    #[must_use]
    pub fn from_config(config: &EngineConfig, base_dir: &Path) -> Self {
        let working_dir = config
            .working_dir
            .as_deref()
            .map_or_else(|| base_dir.to_path_buf(), |d| base_dir.join(d));
        Self::with_runner(ProcessRunner::new(), &config.binary, Some(working_dir))
    }
}

impl<R: CommandRunner> TerraformEngine<R> {
    /// Creates an engine with a custom command runner.
    #[must_use]
    pub fn with_runner(runner: R, binary: &str, working_dir: Option<PathBuf>) -> Self {
        Self {
            runner,
            binary: binary.to_string(),
            working_dir,
        }
    }

    /// Returns the engine binary.
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Returns the working directory, if set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    async fn run(&self, args: Vec<String>) -> Result<CommandOutput, EngineError> {
        let output = self
            .runner
            .run(&self.binary, &args, self.working_dir.as_deref())
            .await
            .map_err(|e| EngineError::SpawnFailed {
                binary: self.binary.clone(),
                message: e.to_string(),
            })?;

        if output.success {
            Ok(output)
        } else {
            Err(EngineError::CommandFailed {
                command: command_line(&self.binary, &args),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl<R: CommandRunner> DeclarativeEngine for TerraformEngine<R> {
    async fn list(&self) -> Result<Vec<String>, EngineError> {
        match self.run(vec!["state".into(), "list".into()]).await {
            Ok(output) => Ok(output
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()),
            Err(EngineError::CommandFailed { stderr, .. }) if stderr.contains(NO_STATE) => {
                debug!("Engine has no state yet");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn import(&self, address: &str, native_id: &str) -> Result<(), EngineError> {
        info!("Importing {native_id} into {address}");
        self.run(vec![
            "import".into(),
            "-input=false".into(),
            "-no-color".into(),
            address.into(),
            native_id.into(),
        ])
        .await
        .map(|_| ())
    }

    async fn remove(&self, address: &str) -> Result<(), EngineError> {
        info!("Removing {address} from tracked state");
        self.run(vec!["state".into(), "rm".into(), address.into()])
            .await
            .map(|_| ())
    }

    async fn apply(&self, auto_approve: bool) -> Result<(), EngineError> {
        if auto_approve {
            info!("Running {} apply with auto-approve", self.binary);
            return self
                .run(vec![
                    "apply".into(),
                    "-input=false".into(),
                    "-auto-approve".into(),
                ])
                .await
                .map(|_| ());
        }

        // The engine asks for its own confirmation, so it needs the terminal.
        info!("Running {} apply", self.binary);
        let args = vec![String::from("apply")];
        let output = self
            .runner
            .run_interactive(&self.binary, &args, self.working_dir.as_deref())
            .await
            .map_err(|e| EngineError::SpawnFailed {
                binary: self.binary.clone(),
                message: e.to_string(),
            })?;

        if output.success {
            Ok(())
        } else {
            Err(EngineError::CommandFailed {
                command: command_line(&self.binary, &args),
                stderr: format!("exited with {:?}", output.exit_code),
            })
        }
    }
}
