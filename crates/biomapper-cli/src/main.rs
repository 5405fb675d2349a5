// biomapper-cli/src/main.rs
// ============================================================================
// Module: Biomapper CLI Entry Point
// Description: Command dispatcher for server and offline strategy runs.
// Purpose: Provide serve, run, list, and validate commands with the
//          documented exit-code contract.
// Dependencies: biomapper-config, biomapper-core, biomapper-server, clap, tokio
// ============================================================================

//! ## Overview
//! The CLI wraps the server assembly: `serve` runs the HTTP surface,
//! `run` executes one strategy offline to completion, `list` prints the
//! loaded strategies, and `validate` checks a strategies directory without
//! executing anything. Exit codes: 0 success, 2 strategy not found,
//! 3 parameter validation failed, 4 job failed, 5 cancelled, 1 other.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use biomapper_config::BiomapperConfig;
use biomapper_server::ApiError;
use biomapper_server::StderrJobAuditSink;
use biomapper_server::build_manager;
use biomapper_server::build_registry;
use clap::Args;
use clap::Parser;
use clap::Subcommand;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Exit code for unclassified failures.
const EXIT_OTHER: u8 = 1;
/// Exit code when the strategy is unknown.
const EXIT_STRATEGY_NOT_FOUND: u8 = 2;
/// Exit code when parameter validation fails.
const EXIT_PARAM_VALIDATION: u8 = 3;
/// Exit code when the job fails.
const EXIT_JOB_FAILED: u8 = 4;
/// Exit code when the job is cancelled.
const EXIT_CANCELLED: u8 = 5;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "biomapper", arg_required_else_help = true)]
struct Cli {
    /// Optional config file path (defaults to biomapper.toml or env
    /// override).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP job server.
    Serve,
    /// Run one strategy offline to completion.
    Run(RunCommand),
    /// List the loaded strategies.
    List,
    /// Validate the strategies directory without executing.
    Validate,
}

/// Arguments for the offline run command.
#[derive(Args, Debug)]
struct RunCommand {
    /// Strategy name to execute.
    strategy: String,
    /// Parameter overrides as `name=value`; values parse as JSON when
    /// possible and fall back to strings.
    #[arg(long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Parses arguments, loads configuration, and dispatches the command.
fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match BiomapperConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            emit_error(&format!("config: {error}"));
            return ExitCode::from(EXIT_OTHER);
        }
    };
    match cli.command {
        Commands::Serve => serve(config),
        Commands::Run(command) => run(&config, &command),
        Commands::List => list(&config),
        Commands::Validate => validate(&config),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Runs the HTTP server until interrupted.
fn serve(config: BiomapperConfig) -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            emit_error(&format!("runtime: {error}"));
            return ExitCode::from(EXIT_OTHER);
        }
    };
    match runtime.block_on(biomapper_server::serve(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            emit_error(&error.to_string());
            ExitCode::from(EXIT_OTHER)
        }
    }
}

/// Executes one strategy offline and prints the terminal summary.
fn run(config: &BiomapperConfig, command: &RunCommand) -> ExitCode {
    let parameters = match parse_params(&command.params) {
        Ok(parameters) => parameters,
        Err(message) => {
            emit_error(&message);
            return ExitCode::from(EXIT_PARAM_VALIDATION);
        }
    };
    let manager = match build_manager(config, Arc::new(StderrJobAuditSink)) {
        Ok(manager) => manager,
        Err(error) => {
            emit_error(&error.to_string());
            return ExitCode::from(EXIT_OTHER);
        }
    };
    let job_id = match manager.submit(&command.strategy, parameters) {
        Ok(job_id) => job_id,
        Err(ApiError::StrategyNotFound(name)) => {
            emit_error(&format!("strategy not found: {name}"));
            return ExitCode::from(EXIT_STRATEGY_NOT_FOUND);
        }
        Err(ApiError::Validation(message)) => {
            emit_error(&message);
            return ExitCode::from(EXIT_PARAM_VALIDATION);
        }
        Err(error) => {
            emit_error(&error.to_string());
            return ExitCode::from(EXIT_OTHER);
        }
    };
    let record = match manager.run_to_completion(&job_id) {
        Ok(record) => record,
        Err(error) => {
            emit_error(&error.to_string());
            return ExitCode::from(EXIT_OTHER);
        }
    };
    emit_json(&serde_json::json!({
        "job_id": record.job_id.as_str(),
        "status": record.status.as_str(),
        "completed_steps": record.completed_steps,
        "failed_step": record.failed_step,
        "error": record.error.as_ref().map(ToString::to_string),
        "output_files": record.output_files,
    }));
    match record.status {
        biomapper_core::JobStatus::Succeeded => ExitCode::SUCCESS,
        biomapper_core::JobStatus::Cancelled => ExitCode::from(EXIT_CANCELLED),
        _ => ExitCode::from(EXIT_JOB_FAILED),
    }
}

/// Lists loaded strategies as JSON.
fn list(config: &BiomapperConfig) -> ExitCode {
    match build_manager(config, Arc::new(StderrJobAuditSink)) {
        Ok(manager) => {
            emit_json(&serde_json::json!(manager.library().list()));
            ExitCode::SUCCESS
        }
        Err(error) => {
            emit_error(&error.to_string());
            ExitCode::from(EXIT_OTHER)
        }
    }
}

/// Validates the strategies directory without executing anything.
fn validate(config: &BiomapperConfig) -> ExitCode {
    let registry = match build_registry(config) {
        Ok(registry) => registry,
        Err(error) => {
            emit_error(&error.to_string());
            return ExitCode::from(EXIT_OTHER);
        }
    };
    match biomapper_config::StrategyLibrary::load_dir(&config.paths.strategies_dir, &registry) {
        Ok(library) => {
            emit_json(&serde_json::json!({
                "status": "ok",
                "strategies": library.len(),
            }));
            ExitCode::SUCCESS
        }
        Err(error) => {
            emit_error(&error.to_string());
            ExitCode::from(EXIT_OTHER)
        }
    }
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Parses `name=value` parameter overrides.
fn parse_params(
    entries: &[String],
) -> Result<BTreeMap<String, serde_json::Value>, String> {
    let mut parameters = BTreeMap::new();
    for entry in entries {
        let Some((name, value)) = entry.split_once('=') else {
            return Err(format!("parameter override must be NAME=VALUE: {entry}"));
        };
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        parameters.insert(name.to_string(), value);
    }
    Ok(parameters)
}

/// Writes a JSON document to stdout.
fn emit_json(value: &serde_json::Value) {
    #[allow(clippy::print_stdout, reason = "stdout is the CLI's output channel")]
    {
        let rendered = serde_json::to_string_pretty(value).unwrap_or_default();
        println!("{rendered}");
    }
}

/// Writes an error line to stderr.
fn emit_error(message: &str) {
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "biomapper: {message}");
}

#[cfg(test)]
mod main_tests;
