//! Drafthorse CLI — the main entry point.
//!
//! Commands:
//! - `run`         — Consume the mailbox until SIGINT/SIGTERM
//! - `healthcheck` — Check connectivity to the mailbox transport
//!
//! Exit codes: 0 on success, 1 on runtime/health failure, 2 on
//! configuration error.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use drafthorse_agent::{AgentRuntime, perform_healthcheck};
use drafthorse_config::AgentConfig;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "drafthorse",
    about = "Drafthorse — mailbox worker for LLM prompt processing",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until interrupted
    Run,

    /// Check connectivity to the mailbox transport
    Healthcheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    init_tracing(cli.verbose, &config.log_level);

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Healthcheck => healthcheck(config).await,
    }
}

fn init_tracing(verbose: bool, log_level: &str) {
    let filter = if verbose { "debug" } else { log_level };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(config: AgentConfig) -> ExitCode {
    let runtime = match AgentRuntime::from_config(config) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let shutdown = runtime.shutdown_token();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested");
        shutdown.cancel();
    });

    match runtime.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Agent runtime failed");
            ExitCode::FAILURE
        }
    }
}

async fn healthcheck(config: AgentConfig) -> ExitCode {
    if perform_healthcheck(&config).await {
        println!("Agent is healthy");
        ExitCode::SUCCESS
    } else {
        eprintln!("Agent is unhealthy");
        ExitCode::FAILURE
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
