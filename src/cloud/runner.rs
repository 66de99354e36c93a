//! Command runner abstraction for external CLIs.
//!
//! Cloud probes and the declarative engine both shell out (`aws`, `az`,
//! `terraform`). They do so through [`CommandRunner`] so tests can script
//! the responses without touching a real cloud account.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tracing::{debug, trace};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited successfully.
    pub success: bool,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// A successful result with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// A failed result with the given stderr.
    #[must_use]
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(1),
        }
    }
}

/// Executes external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and captures its output.
    ///
    /// Dropping the returned future must terminate the child process.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> std::io::Result<CommandOutput>;

    /// Runs `program` attached to the terminal, so it can prompt the operator.
    /// Output is not captured.
    async fn run_interactive(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> std::io::Result<CommandOutput>;
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn command(program: &str, args: &[String], cwd: Option<&Path>) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args).kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> std::io::Result<CommandOutput> {
        debug!("Running: {}", command_line(program, args));

        let output = Self::command(program, args, cwd)
            .stdin(Stdio::null())
            .output()
            .await?;

        let result = CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        trace!("{program} exited with {:?}", result.exit_code);
        Ok(result)
    }

    async fn run_interactive(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> std::io::Result<CommandOutput> {
        debug!("Running interactively: {}", command_line(program, args));

        let status = Self::command(program, args, cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        Ok(CommandOutput {
            success: status.success(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: status.code(),
        })
    }
}

/// Renders a command line for logs and error messages.
#[must_use]
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        if arg.contains(' ') {
            line.push('\'');
            line.push_str(arg);
            line.push('\'');
        } else {
            line.push_str(arg);
        }
    }
    line
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner shared by the cloud and engine tests.

    use super::{CommandOutput, CommandRunner, command_line};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    /// Returns preset responses in order and records every command line.
    #[derive(Debug, Default)]
    pub struct ScriptedRunner {
        responses: Mutex<VecDeque<std::io::Result<CommandOutput>>>,
        commands: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn with_responses(responses: Vec<CommandOutput>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(Ok).collect()),
                commands: Mutex::new(Vec::new()),
            }
        }

        pub fn push_io_error(&self, kind: std::io::ErrorKind) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(std::io::Error::from(kind)));
        }

        pub fn executed_commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }

        fn next(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
            self.commands
                .lock()
                .unwrap()
                .push(command_line(program, args));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(CommandOutput::ok("")))
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            _cwd: Option<&Path>,
        ) -> std::io::Result<CommandOutput> {
            self.next(program, args)
        }

        async fn run_interactive(
            &self,
            program: &str,
            args: &[String],
            _cwd: Option<&Path>,
        ) -> std::io::Result<CommandOutput> {
            self.next(program, args)
        }
    }
}
