//! `kodo` application entry point.
//!
//! This binary launches a workload on a Docker engine or Kubernetes cluster,
//! runs one command inside it, prints the captured output, and exits with
//! the command's own exit code. Failures before any command ran exit with a
//! distinct setup-failure code.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/kodo/config.toml` or path from `KODO_CONFIG_PATH`)
//! 3. Environment variables (`KODO_*`)
//! 4. Command-line arguments

use clap::Parser;
use eyre::{Report, Result as EyreResult};
use kodo::api::{
    RunParams, SETUP_FAILURE_EXIT_CODE, parse_environment, parse_node_selector, process_exit_code,
    run_workload,
};
use kodo::config::{AppConfig, Cli, Commands, load_config};
use kodo::error::KodoError;
use kodo::workload::{BackendKind, ExecutionResult};
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Loads configuration with layered precedence via `OrthoConfig`, then runs
/// the selected backend's workload on a dedicated runtime. The process exit
/// code mirrors the executed command; setup and connectivity failures -
/// including configuration errors - exit with [`SETUP_FAILURE_EXIT_CODE`].
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
#[expect(clippy::print_stderr, reason = "CLI error reporting is the intended behaviour")]
fn main() -> EyreResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI first (for subcommand dispatch and global options).
    let cli = Cli::parse();

    match execute(&cli) {
        Ok(result) => {
            print!("{}", result.output());
            std::process::exit(process_exit_code(&result));
        }
        Err(error) => {
            eprintln!("Error: {error}");
            std::process::exit(SETUP_FAILURE_EXIT_CODE);
        }
    }
}

/// Load configuration, build a runtime, and run the selected command.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to presentation and exit codes.
fn execute(cli: &Cli) -> EyreResult<ExecutionResult> {
    // Load configuration with layered precedence: defaults < file < env < CLI.
    let config = load_config(cli).map_err(Report::from)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli, &config)).map_err(Report::from)
}

/// Dispatch to the selected backend's orchestration.
async fn run(cli: &Cli, config: &AppConfig) -> Result<ExecutionResult, KodoError> {
    match cli.command {
        Commands::Docker(ref args) => {
            let environment = parse_environment(args.env.as_deref())?;
            run_workload(RunParams {
                config,
                backend: BackendKind::Docker,
                image: &args.image,
                name: args.name.clone(),
                command: &args.cmd,
                environment,
                node_selector: None,
            })
            .await
        }
        Commands::Kubernetes(ref args) => {
            let environment = parse_environment(args.env.as_deref())?;
            let node_selector = parse_node_selector(args.node_selector.as_deref())?;
            run_workload(RunParams {
                config,
                backend: BackendKind::Kubernetes,
                image: &args.image,
                name: args.name.clone(),
                command: &args.cmd,
                environment,
                node_selector,
            })
            .await
        }
    }
}
