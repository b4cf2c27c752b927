//! devfleet CLI binary
//!
//! Launches a worker fleet from a TOML definition, attaches the IDE
//! debugger where requested, and renders the orchestrator's event stream
//! until interrupted.

#![allow(unused_crate_dependencies)]

use clap::{Parser, Subcommand};
use cli::{fleet_table, format_event, CliError};
use devfleet_core::ide::NullAutomationRegistry;
use devfleet_core::process::NativeProcessAdapter;
use devfleet_core::window::NullWindowSystem;
use devfleet_core::{spawn_orchestrator, FleetConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

#[derive(Parser)]
#[command(name = "devfleet")]
#[command(about = "Launch a worker fleet, attach the debugger, tear it down")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the fleet and render events until Ctrl-C
    Run {
        /// Path to the fleet TOML definition
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Validate a fleet definition and print the fleet table
    Check {
        /// Path to the fleet TOML definition
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> cli::Result<()> {
    let args = Cli::parse();
    devfleet_core::utils::init_tracing(&args.log_level)?;

    match args.command {
        Commands::Run { config } => run(config).await,
        Commands::Check { config } => check(config),
    }
}

fn check(path: PathBuf) -> cli::Result<()> {
    let config = FleetConfig::load(&path)?;
    print!("{}", fleet_table(&config));
    Ok(())
}

async fn run(path: PathBuf) -> cli::Result<()> {
    let config = FleetConfig::load(&path)?;
    let (solution, projects) = config.into_projects();

    let handle = spawn_orchestrator(
        solution,
        projects,
        Arc::new(NativeProcessAdapter::new()),
        Arc::new(NullAutomationRegistry),
        Box::new(NullWindowSystem),
    );
    let mut events = handle.subscribe_events();

    handle.run_and_attach().await?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.map_err(CliError::IoError)?;
                println!("   interrupted, stopping fleet");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}", format_event(&event)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    error!(skipped, "Event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    handle.stop().await?;
    handle.shutdown().await?;
    Ok(())
}
