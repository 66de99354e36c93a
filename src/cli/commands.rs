//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// converge - import existing cloud resources into Terraform state and
/// report convergence.
#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "CONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration and catalog.
    Validate {
        /// Show warnings as well as errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// List the catalog in dependency order.
    Catalog {
        /// List in destroy (reverse) order.
        #[arg(long)]
        reverse: bool,
    },

    /// Probe, read tracked state and show the reconciliation plan.
    Plan,

    /// Import live resources the engine does not track yet. Never creates.
    ImportIfMissing {
        /// Show what would be imported without importing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Import existing resources, then run the engine's apply for the rest.
    Apply {
        /// Skip the import prompt and pass `-auto-approve` to the engine.
        #[arg(long, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
        auto_approve: bool,

        /// Show what would happen without importing or applying.
        #[arg(long)]
        dry_run: bool,
    },

    /// Report resources whose live and tracked state disagree.
    Drift,

    /// Resolve a conflict on one resource (asks for the resource name).
    Resolve {
        /// Logical name of the resource.
        name: String,
    },

    /// Inspect tracked state and the run lock.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show tracked state for catalog resources.
    Show,

    /// List every tracked address.
    List,

    /// Take the run lock.
    Lock {
        /// Lock holder identifier.
        #[arg(long)]
        holder: Option<String>,
    },

    /// Release the run lock.
    Unlock {
        /// Lock ID to release.
        #[arg(long)]
        lock_id: Option<String>,

        /// Remove the lock whoever holds it.
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
