// crates/sticky-assign-cli/src/main.rs
// ============================================================================
// Module: Sticky Assign CLI Entry Point
// Description: Command dispatcher for the sticky assignment service.
// Purpose: Run the HTTP server, validate configuration, and preview bucketing.
// Dependencies: clap, sticky-assign-{config, core, http}, tokio, tracing
// ============================================================================

//! ## Overview
//! `sticky-assign serve` loads configuration, opens the store, and serves
//! HTTP until Ctrl-C or SIGTERM. `sticky-assign config validate` loads and
//! validates configuration without opening the store. `sticky-assign bucket`
//! runs the bucketing engine offline against variants given on the command
//! line; it never touches storage.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use sticky_assign_config::StickyAssignConfig;
use sticky_assign_core::Assignment;
use sticky_assign_core::Variant;
use sticky_assign_core::assign_variant;
use sticky_assign_core::stable_hash;
use sticky_assign_http::StickyAssignServer;
use sticky_assign_http::shutdown_signal;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "sticky-assign", version, about = "Sticky A/B variant assignment service")]
struct Cli {
    /// Command to run.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Configuration subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Preview a bucketing decision without touching storage.
    Bucket(BucketCommand),
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Config file path (defaults to `STICKY_ASSIGN_CONFIG` or `sticky-assign.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate configuration.
    Validate(ConfigValidateCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Config file path (defaults to `STICKY_ASSIGN_CONFIG` or `sticky-assign.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `bucket`.
#[derive(Args, Debug)]
struct BucketCommand {
    /// Experiment identifier.
    #[arg(long, value_name = "EXPERIMENT_ID")]
    experiment: String,
    /// User identifier.
    #[arg(long, value_name = "USER_ID")]
    user: String,
    /// Variant as `KEY=WEIGHT`, in creation order; repeat per variant.
    #[arg(long = "variant", value_name = "KEY=WEIGHT", required = true, value_parser = parse_variant)]
    variants: Vec<Variant>,
}

/// Output of `bucket`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BucketPreview {
    /// Selected assignment.
    #[serde(flatten)]
    assignment: Assignment,
    /// FNV-1a hash of `experimentId:userId`.
    hash: u64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Installs the stderr log subscriber; `RUST_LOG` overrides the `info` default.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Bucket(command) => command_bucket(&command),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = StickyAssignConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    if let Some(source) = &config.source {
        tracing::info!(path = %source.display(), "configuration loaded");
    }

    let server = tokio::task::spawn_blocking(move || StickyAssignServer::from_config(config))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server
        .serve(shutdown_signal())
        .await
        .map_err(|err| CliError::new(format!("server failed: {err}")))?;

    Ok(ExitCode::SUCCESS)
}

/// Executes configuration subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(&command),
    }
}

/// Executes the config validation command.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let config = StickyAssignConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let source = config
        .source
        .as_ref()
        .map_or_else(|| "built-in defaults".to_string(), |path| path.display().to_string());
    write_stdout_line(&format!("config ok ({source})"))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the offline `bucket` preview.
fn command_bucket(command: &BucketCommand) -> CliResult<ExitCode> {
    let preview = bucket_preview(command)?;
    let json = serde_json::to_string(&preview)
        .map_err(|err| CliError::new(format!("failed to render output: {err}")))?;
    write_stdout_line(&json).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Buckets the command's pair against its variants.
fn bucket_preview(command: &BucketCommand) -> CliResult<BucketPreview> {
    let assignment = assign_variant(&command.experiment, &command.user, &command.variants)
        .map_err(|err| CliError::new(format!("bucketing failed: {err}")))?;
    let hash = stable_hash(assignment.experiment_id.as_str(), assignment.user_id.as_str());
    Ok(BucketPreview {
        assignment,
        hash,
    })
}

// ============================================================================
// SECTION: Argument Parsing
// ============================================================================

/// Parses a `KEY=WEIGHT` variant argument.
///
/// The last `=` separates the weight, so keys may contain `=`. Non-positive
/// weights are accepted here; the bucketing engine skips them.
fn parse_variant(raw: &str) -> Result<Variant, String> {
    let Some((key, weight)) = raw.rsplit_once('=') else {
        return Err(format!("expected KEY=WEIGHT, got `{raw}`"));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("variant key is empty in `{raw}`"));
    }
    let weight = weight
        .trim()
        .parse::<i64>()
        .map_err(|err| format!("invalid weight in `{raw}`: {err}"))?;
    Ok(Variant::new(key, weight))
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Writes an error to stderr and returns the failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
