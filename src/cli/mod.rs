//! Command-line interface for `converge`.
//!
//! Argument parsing lives in `commands`; text and JSON rendering of plans,
//! reports and state lives in `output`.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
