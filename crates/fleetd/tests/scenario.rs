//! End-to-end scenario: registry, router, and monitor against real
//! workers.
//!
//! Three compute workers register; the router discovers them and
//! balances 3-3-3; one worker dies and stops heartbeating; the registry
//! sweep marks it stale, the router's next discovery drops it from the
//! rotation, and the monitor independently raises one failure event for
//! it.

use std::collections::HashMap;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use fleet_core::config::ClassConfig;
use fleet_core::{FetchClient, Registration};
use fleet_monitor::{
    Alerter, EventHub, HealthLedger, MetricsMirror, MonitorEvent, Watcher, WatcherConfig,
};
use fleet_registry::{run_sweeper, RegistryClient, ServiceDirectory};
use fleet_router::{
    DiscoverySync, DispatchConfig, Dispatcher, MetricsBook, RouteTable, RouterState,
};

async fn spawn_app(app: Router) -> (String, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), handle)
}

fn worker_app(tag: String) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(
            "/api/compute/whoami",
            get(move || async move { Json(json!({ "servedBy": tag })) }),
        )
}

#[tokio::test]
async fn registry_router_monitor_end_to_end() {
    // Registry with a short heartbeat timeout and a fast sweep.
    let directory = ServiceDirectory::new(Duration::from_millis(300));
    let (registry_url, _registry_handle) = spawn_app(fleet_registry::build_router(
        directory.clone(),
    ))
    .await;
    let (_sweep_tx, sweep_rx) = watch::channel(false);
    tokio::spawn(run_sweeper(
        directory.clone(),
        Duration::from_millis(100),
        sweep_rx,
    ));

    // Three compute workers.
    let mut worker_urls = Vec::new();
    let mut worker_handles = Vec::new();
    for i in 1..=3 {
        let (url, handle) = spawn_app(worker_app(format!("w{i}"))).await;
        worker_urls.push(url);
        worker_handles.push(handle);
    }

    let client = RegistryClient::new(registry_url.clone());
    for (i, url) in worker_urls.iter().enumerate() {
        client
            .register(&Registration {
                service_id: format!("compute-{}", i + 1),
                service_type: "compute".to_string(),
                url: url.clone(),
                name: format!("Compute {}", i + 1),
                metadata: Default::default(),
            })
            .await
            .unwrap();
    }

    // Workers 1 and 2 keep heartbeating; worker 3 goes silent.
    let heartbeat_client = RegistryClient::new(registry_url.clone());
    let heartbeats = tokio::spawn(async move {
        loop {
            let _ = heartbeat_client.heartbeat("compute-1").await;
            let _ = heartbeat_client.heartbeat("compute-2").await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    // Router in dynamic mode.
    let table = RouteTable::new(3, false);
    table.add_class("compute", &[]);
    let metrics = MetricsBook::new();
    let discovery = DiscoverySync::new(
        table.clone(),
        metrics.clone(),
        RegistryClient::new(registry_url.clone()),
        &[ClassConfig {
            name: "compute".to_string(),
            targets: vec![],
        }],
        Duration::from_secs(15),
    );
    discovery.sync_once().await;
    assert_eq!(table.counts("compute"), (3, 0));

    let dispatcher = Dispatcher::new(
        table.clone(),
        metrics.clone(),
        DispatchConfig {
            max_attempts: 3,
            request_timeout: Duration::from_millis(500),
            retry_backoff: Duration::from_millis(1),
        },
    );
    let (router_url, _router_handle) = spawn_app(fleet_router::build_router(RouterState {
        table: table.clone(),
        metrics: metrics.clone(),
        dispatcher,
    }))
    .await;

    // Nine dispatches distribute 3-3-3.
    let fetch = FetchClient::new();
    let mut counts: HashMap<String, u32> = HashMap::new();
    for _ in 0..9 {
        let v: Value = fetch
            .get_json(
                &format!("{router_url}/api/compute/whoami"),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        *counts
            .entry(v["servedBy"].as_str().unwrap().to_string())
            .or_default() += 1;
    }
    assert_eq!(counts.len(), 3, "counts: {counts:?}");
    assert!(counts.values().all(|&c| c == 3), "counts: {counts:?}");

    // Worker 3 dies: listener gone, heartbeats already silent.
    worker_handles[2].abort();
    tokio::time::sleep(Duration::from_millis(600)).await;

    // The sweep marked it stale while the heartbeating workers stayed
    // healthy; it is still registered, only flagged.
    assert!(!client.get_service("compute-3").await.unwrap().healthy);
    assert!(client.get_service("compute-1").await.unwrap().healthy);
    assert!(client.get_service("compute-2").await.unwrap().healthy);

    // The next discovery pass drops it from the healthy rotation.
    discovery.sync_once().await;
    assert_eq!(table.counts("compute"), (2, 1));

    // Ten more dispatches distribute 5-5 over the survivors.
    let mut counts: HashMap<String, u32> = HashMap::new();
    for _ in 0..10 {
        let v: Value = fetch
            .get_json(
                &format!("{router_url}/api/compute/whoami"),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        *counts
            .entry(v["servedBy"].as_str().unwrap().to_string())
            .or_default() += 1;
    }
    assert_eq!(counts.len(), 2, "counts: {counts:?}");
    assert!(!counts.contains_key("w3"));
    assert!(counts.values().all(|&c| c == 5), "counts: {counts:?}");

    // The monitor discovers the same fleet from the registry and,
    // after three consecutive probe failures, raises exactly one
    // failure event for the dead worker.
    let ledger = HealthLedger::new(3, 1000);
    let hub = EventHub::new();
    let mut events = hub.subscribe();
    let watcher = Watcher::new(
        ledger.clone(),
        Alerter::new(Duration::from_secs(60)),
        hub.clone(),
        MetricsMirror::new(),
        WatcherConfig {
            registry_url: Some(registry_url.clone()),
            static_targets: vec![],
            check_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(300),
        },
    );

    for _ in 0..3 {
        watcher.run_cycle().await;
    }

    let mut failures = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let MonitorEvent::ServiceFailure { service, .. } = event {
            failures.push(service.url.clone());
        }
    }
    assert_eq!(failures, vec![worker_urls[2].clone()]);

    assert_eq!(
        ledger.record(&worker_urls[2]).unwrap().consecutive_failures,
        3
    );
    assert_eq!(ledger.summary().healthy, 2);

    heartbeats.abort();
}
