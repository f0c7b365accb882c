//! fleetd — the fleet control plane daemon.
//!
//! One binary, three modes:
//! - `registry` — the membership directory and its stale sweep
//! - `router` — the load balancer with discovery and active probing
//! - `monitor` — the fault detector with alerting and live broadcast
//!
//! # Usage
//!
//! ```text
//! fleetd registry --bind 0.0.0.0:3005
//! fleetd router --config fleet.toml
//! fleetd monitor --config fleet.toml
//! ```

mod monitor_mode;
mod registry_mode;
mod router_mode;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fleet_core::FleetConfig;

#[derive(Parser)]
#[command(name = "fleetd", about = "Fleet control plane daemon")]
struct Cli {
    /// Path to fleet.toml; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the service registry.
    Registry {
        /// Bind address override.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the request router / load balancer.
    Router {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the health monitor.
    Monitor {
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleetd=debug,fleet=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => FleetConfig::from_file(path)?,
        None => FleetConfig::default(),
    };

    match cli.command {
        Command::Registry { bind } => {
            if let Some(bind) = bind {
                config.registry.bind = bind;
            }
            registry_mode::run(config.registry).await
        }
        Command::Router { bind } => {
            if let Some(bind) = bind {
                config.router.bind = bind;
            }
            router_mode::run(config.router).await
        }
        Command::Monitor { bind } => {
            if let Some(bind) = bind {
                config.monitor.bind = bind;
            }
            monitor_mode::run(config.monitor).await
        }
    }
}
