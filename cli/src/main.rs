//! Tether launcher binary
//!
//! Starts the backend process, waits for it to become ready and keeps it
//! alive until Ctrl+C.

use anyhow::Context;
use clap::{Parser, Subcommand};
use cli::{CliError, Overrides, RunOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use tether_core::logging::init_tracing;
use tether_core::BackendSupervisor;
use tracing::error;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Launch a backend process and wait until it is ready to serve")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML config (defaults to ./tether.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level filter (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the backend and keep it running until Ctrl+C
    Run {
        /// Launch the bundled executable instead of interpreter + script
        #[arg(long)]
        packaged: bool,
        /// Startup timeout in milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },
    /// Validate the config and show how the backend would be launched
    Check {
        /// Resolve the packaged executable instead of interpreter + script
        #[arg(long)]
        packaged: bool,
    },
    /// Run the readiness probe once against a running backend
    Probe,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<CliError>() {
                Some(cli_error) => error!("[{}] {:#}", cli_error.code(), e),
                None => error!("{:#}", e),
            }
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            packaged,
            timeout_ms,
        } => {
            let spec = cli::load_spec(config, &Overrides { packaged, timeout_ms })
                .context("failed to load configuration")?;
            let mut supervisor = BackendSupervisor::with_defaults(spec);

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            match cli::run(&mut supervisor, shutdown).await? {
                RunOutcome::Shutdown => {
                    println!("Backend stopped");
                    Ok(ExitCode::SUCCESS)
                }
                RunOutcome::BackendExited => Err(CliError::BackendExited.into()),
            }
        }
        Commands::Check { packaged } => {
            let spec = cli::load_spec(
                config,
                &Overrides {
                    packaged,
                    timeout_ms: None,
                },
            )
            .context("failed to load configuration")?;
            println!("{}", cli::describe(&spec)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Probe => {
            let spec = cli::load_spec(config, &Overrides::default())
                .context("failed to load configuration")?;
            cli::probe_once(&spec).await?;
            println!("Backend is accepting requests on port {}", spec.port);
            Ok(ExitCode::SUCCESS)
        }
    }
}
