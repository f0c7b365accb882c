//! Registry mode — serve the membership directory.

use std::net::SocketAddr;

use tokio::sync::watch;
use tracing::info;

use fleet_core::config::RegistryConfig;
use fleet_registry::{build_router, run_sweeper, ServiceDirectory};

pub async fn run(config: RegistryConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config.bind.parse()?;

    let directory = ServiceDirectory::new(config.heartbeat_timeout());
    info!(
        heartbeat_timeout_ms = config.heartbeat_timeout_ms,
        "service directory initialized"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = tokio::spawn(run_sweeper(
        directory.clone(),
        config.sweep_interval(),
        shutdown_rx,
    ));

    let app = build_router(directory);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "registry listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = sweeper.await;
    info!("registry stopped");
    Ok(())
}
