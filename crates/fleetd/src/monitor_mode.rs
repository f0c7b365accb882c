//! Monitor mode — serve the fault detector and its background loops.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use fleet_core::config::MonitorConfig;
use fleet_monitor::{
    build_router, Alerter, EventHub, HealthLedger, MetricsCorrelator, MetricsMirror,
    MonitorState, TargetSpec, Watcher, WatcherConfig,
};

pub async fn run(config: MonitorConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config.bind.parse()?;

    let ledger = HealthLedger::new(config.alert_threshold, config.slow_response_threshold_ms);
    let alerter = Alerter::new(config.cooldown());
    let hub = EventHub::new();
    let mirror = MetricsMirror::new();

    let static_targets: Vec<TargetSpec> = config
        .target
        .iter()
        .map(|t| TargetSpec {
            name: t.name.clone(),
            service_type: t.service_type.clone(),
            url: t.url.clone(),
        })
        .collect();

    let watcher = Arc::new(Watcher::new(
        ledger.clone(),
        alerter,
        hub.clone(),
        mirror.clone(),
        WatcherConfig {
            registry_url: config.registry_url.clone(),
            static_targets,
            check_interval: config.check_interval(),
            probe_timeout: config.probe_timeout(),
        },
    ));
    info!(
        check_interval_ms = config.check_interval_ms,
        alert_threshold = config.alert_threshold,
        registry_backed = config.registry_url.is_some(),
        "watcher initialized"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    let watch_loop = watcher.clone();
    let watch_shutdown = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
        watch_loop.run(watch_shutdown).await;
    }));

    if let Some(router_url) = &config.router_url {
        let correlator = MetricsCorrelator::new(
            router_url.clone(),
            mirror.clone(),
            hub.clone(),
            config.metrics_poll_interval(),
        );
        handles.push(tokio::spawn(correlator.run(shutdown_rx.clone())));
    }

    let state = MonitorState {
        ledger,
        mirror,
        hub,
        watcher,
    };
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "monitor listening");

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
    info!("monitor stopped");
    Ok(())
}
