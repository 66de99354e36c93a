//! converge CLI entrypoint.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use infra_converge::catalog::Catalog;
use infra_converge::cli::{Cli, Commands, OutputFormat, OutputFormatter, StateCommands};
use infra_converge::cloud::{CloudQuery, query_for};
use infra_converge::config::{
    ConfigParser, ConfigValidator, ConvergeConfig, ValidationError, find_config_file,
};
use infra_converge::confirm::TerminalConfirmer;
use infra_converge::engine::TerraformEngine;
use infra_converge::error::Result;
use infra_converge::probe::Prober;
use infra_converge::reconciler::{Reconciler, RunMode};
use infra_converge::state::{TrackedStateReader, TrackedStateSource, open_source};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for a run that needs an operator.
const EXIT_NEEDS_ATTENTION: u8 = 2;

type CliReconciler = Reconciler<Box<dyn CloudQuery>, Box<dyn TrackedStateSource>, TerraformEngine>;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.output == OutputFormat::Json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes logging on stderr so stdout stays clean for output.
fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point. Returns the process exit code.
async fn run(cli: Cli) -> Result<u8> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Catalog { reverse } => cmd_catalog(config_path, reverse, &formatter),
        Commands::Plan => cmd_plan(config_path, &formatter).await,
        Commands::ImportIfMissing { dry_run } => {
            cmd_run(config_path, RunMode::ImportIfMissing, dry_run, &formatter).await
        }
        Commands::Apply {
            auto_approve,
            dry_run,
        } => cmd_run(config_path, RunMode::Apply { auto_approve }, dry_run, &formatter).await,
        Commands::Drift => cmd_drift(config_path, &formatter).await,
        Commands::Resolve { name } => cmd_resolve(config_path, &name, &formatter).await,
        Commands::State { command } => cmd_state(config_path, command, &formatter).await,
    }
}

/// Validate configuration and catalog.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<u8> {
    let (config, _) = load_config(config_path)?;

    let mut result = ConfigValidator::new().check(&config);
    if result.is_valid()
        && let Err(e) = Catalog::from_config(&config)
    {
        result.errors.push(ValidationError {
            field: String::from("resources"),
            message: e.to_string(),
        });
    }

    emit(&formatter.format_validation(&result, show_warnings))?;
    if !formatter.is_json() && result.is_valid() {
        eprintln!("\nConfiguration summary:");
        eprintln!("  Project: {}", config.qualified_name());
        eprintln!("  Provider: {:?}", config.project.provider);
        eprintln!("  Resources: {}", config.resources.len());
    }

    Ok(if result.is_valid() { 0 } else { 1 })
}

/// List the catalog.
fn cmd_catalog(config_path: Option<&PathBuf>, reverse: bool, formatter: &OutputFormatter) -> Result<u8> {
    let (config, _) = load_valid_config(config_path)?;
    let catalog = Catalog::from_config(&config)?;
    emit(&formatter.format_catalog(&catalog, reverse))?;
    Ok(0)
}

/// Show the reconciliation plan.
async fn cmd_plan(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<u8> {
    let reconciler = build_reconciler(config_path).await?;
    let plan = reconciler.plan().await?;
    emit(&formatter.format_plan(&plan))?;

    let needs_attention = plan.conflict_count() > 0 || plan.probe_failure_count() > 0;
    Ok(if needs_attention { EXIT_NEEDS_ATTENTION } else { 0 })
}

/// Import missing resources, optionally followed by engine apply.
async fn cmd_run(
    config_path: Option<&PathBuf>,
    mode: RunMode,
    dry_run: bool,
    formatter: &OutputFormatter,
) -> Result<u8> {
    let reconciler = build_reconciler(config_path)
        .await?
        .with_dry_run(dry_run)
        .with_cancel_flag(cancel_on_ctrl_c());

    let report = reconciler.run(mode).await?;
    emit(&formatter.format_report(&report))?;
    Ok(report.exit_code())
}

/// Check for drift.
async fn cmd_drift(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<u8> {
    let reconciler = build_reconciler(config_path).await?;
    let report = reconciler.check_drift().await?;
    emit(&formatter.format_drift(&report))?;
    Ok(if report.is_converged() { 0 } else { EXIT_NEEDS_ATTENTION })
}

/// Resolve one conflict.
async fn cmd_resolve(config_path: Option<&PathBuf>, name: &str, formatter: &OutputFormatter) -> Result<u8> {
    let reconciler = build_reconciler(config_path).await?;
    let outcome = reconciler.resolve(name).await?;
    emit(&formatter.format_resolve(&outcome))?;
    Ok(0)
}

/// Tracked state and run lock commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<u8> {
    let (config, base_dir) = load_valid_config(config_path)?;
    let reader = TrackedStateReader::new(open_source(&config.state, &engine_dir(&config, &base_dir)).await?);
    let source = reader.source();

    match command {
        StateCommands::Show => {
            let catalog = Catalog::from_config(&config)?;
            let state = reader.load().await?;
            let tracked = state.for_catalog(&catalog);
            emit(&formatter.format_tracked(&state, &tracked, &catalog))?;
        }
        StateCommands::List => {
            let state = reader.load().await?;
            emit(&formatter.format_addresses(&state))?;
        }
        StateCommands::Lock { holder } => {
            let lock = source.acquire_lock(holder.as_deref().unwrap_or("")).await?;
            emit(&formatter.format_lock(&lock))?;
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                source.force_unlock().await?;
                eprintln!("Run lock forcefully removed.");
            } else if let Some(id) = lock_id {
                if source.get_lock_info().await?.is_some() {
                    source.release_lock(&id).await?;
                    eprintln!("Run lock {id} released.");
                } else {
                    eprintln!("No run lock held.");
                }
            } else {
                match source.get_lock_info().await? {
                    Some(lock) => emit(&formatter.format_lock(&lock))?,
                    None => eprintln!("No run lock held."),
                }
                eprintln!("Provide --lock-id or use --force to release it.");
            }
        }
    }

    Ok(0)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads the configuration, `.env` and environment overrides.
fn load_config(config_path: Option<&PathBuf>) -> Result<(ConvergeConfig, PathBuf)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let base_dir = config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;
    Ok((config, base_dir))
}

/// Loads the configuration and fails on the first validation error.
fn load_valid_config(config_path: Option<&PathBuf>) -> Result<(ConvergeConfig, PathBuf)> {
    let (config, base_dir) = load_config(config_path)?;
    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }
    Ok((config, base_dir))
}

/// The engine's working directory; also the base for a local state path.
fn engine_dir(config: &ConvergeConfig, base_dir: &Path) -> PathBuf {
    config
        .engine
        .working_dir
        .as_deref()
        .map_or_else(|| base_dir.to_path_buf(), |d| base_dir.join(d))
}

/// Wires the reconciler from configuration.
async fn build_reconciler(config_path: Option<&PathBuf>) -> Result<CliReconciler> {
    let (config, base_dir) = load_valid_config(config_path)?;
    let catalog = Catalog::from_config(&config)?;
    info!(
        "Loaded catalog for {} with {} resources",
        config.qualified_name(),
        catalog.len()
    );

    let source = open_source(&config.state, &engine_dir(&config, &base_dir)).await?;
    let prober = Prober::from_config(query_for(&config.project), &config.probe);
    let engine = TerraformEngine::from_config(&config.engine, &base_dir);

    Ok(Reconciler::new(
        catalog,
        prober,
        TrackedStateReader::new(source),
        engine,
        Box::new(TerminalConfirmer::new()),
    ))
}

/// Sets the returned flag on Ctrl-C. The current action finishes first.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current action");
            handle.store(true, Ordering::SeqCst);
        }
    });
    flag
}
