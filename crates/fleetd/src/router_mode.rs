//! Router mode — serve the load balancer with its background loops.

use std::net::SocketAddr;

use tokio::sync::watch;
use tracing::info;

use fleet_core::config::RouterConfig;
use fleet_registry::RegistryClient;
use fleet_router::{
    build_router, DiscoverySync, DispatchConfig, Dispatcher, HealthProber, MetricsBook,
    RouteTable, RouterState,
};

pub async fn run(config: RouterConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config.bind.parse()?;
    let dynamic = config.registry_url.is_some();

    let table = RouteTable::new(config.failure_threshold, config.evict_vanished);
    for class in &config.class {
        // In dynamic mode membership comes from discovery; the static
        // seeds stay behind as the never-discovered fallback.
        if dynamic {
            table.add_class(&class.name, &[]);
        } else {
            table.add_class(&class.name, &class.targets);
        }
    }
    info!(
        classes = config.class.len(),
        dynamic, "route table initialized"
    );

    let metrics = MetricsBook::new();
    let dispatcher = Dispatcher::new(
        table.clone(),
        metrics.clone(),
        DispatchConfig {
            max_attempts: config.max_attempts,
            request_timeout: config.request_timeout(),
            retry_backoff: config.retry_backoff(),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    let prober = HealthProber::new(
        table.clone(),
        config.health_check_interval(),
        config.probe_timeout(),
    );
    handles.push(tokio::spawn(prober.run(shutdown_rx.clone())));

    if let Some(registry_url) = &config.registry_url {
        let discovery = DiscoverySync::new(
            table.clone(),
            metrics.clone(),
            RegistryClient::new(registry_url.clone()),
            &config.class,
            config.discovery_interval(),
        );
        handles.push(tokio::spawn(discovery.run(shutdown_rx.clone())));
    }

    let state = RouterState {
        table,
        metrics,
        dispatcher,
    };
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "router listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    for handle in handles {
        let _ = handle.await;
    }
    info!("router stopped");
    Ok(())
}
