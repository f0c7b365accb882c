//! Registry-backed target discovery.
//!
//! Pulls each class's membership from the registry on an interval and
//! reconciles the route table. A failed pull keeps the last known
//! targets; static seeds are applied only if discovery has never
//! succeeded at all.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use fleet_core::config::ClassConfig;
use fleet_registry::RegistryClient;

use crate::metrics::MetricsBook;
use crate::table::RouteTable;

/// Keeps the route table in sync with the registry.
pub struct DiscoverySync {
    table: RouteTable,
    metrics: MetricsBook,
    client: RegistryClient,
    classes: Vec<String>,
    static_seeds: HashMap<String, Vec<String>>,
    interval: Duration,
    ever_synced: Arc<AtomicBool>,
    fallback_applied: Arc<AtomicBool>,
}

impl DiscoverySync {
    pub fn new(
        table: RouteTable,
        metrics: MetricsBook,
        client: RegistryClient,
        classes: &[ClassConfig],
        interval: Duration,
    ) -> Self {
        Self {
            table,
            metrics,
            client,
            classes: classes.iter().map(|c| c.name.clone()).collect(),
            static_seeds: classes
                .iter()
                .map(|c| (c.name.clone(), c.targets.clone()))
                .collect(),
            interval,
            ever_synced: Arc::new(AtomicBool::new(false)),
            fallback_applied: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether any discovery pass has ever succeeded.
    pub fn ever_synced(&self) -> bool {
        self.ever_synced.load(Ordering::Relaxed)
    }

    /// One full discovery pass over every class.
    pub async fn sync_once(&self) {
        let mut failed = false;

        for class in &self.classes {
            // Only registry-healthy instances count as present; a worker
            // whose heartbeats stopped leaves the healthy rotation on the
            // next pass.
            match self.client.discover(class, true).await {
                Ok(records) => {
                    let discovered: Vec<(String, String)> = records
                        .into_iter()
                        .map(|r| (r.url, r.name))
                        .collect();
                    debug!(%class, targets = discovered.len(), "discovery pass");
                    self.table.reconcile(class, &discovered);
                    self.ever_synced.store(true, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(
                        %class,
                        registry = %self.client.base(),
                        error = %e,
                        "discovery failed, keeping last known targets"
                    );
                    failed = true;
                }
            }
        }

        if failed
            && !self.ever_synced.load(Ordering::Relaxed)
            && !self.fallback_applied.swap(true, Ordering::Relaxed)
        {
            info!("registry never reachable, seeding static configuration");
            for (class, urls) in &self.static_seeds {
                let seeded: Vec<(String, String)> =
                    urls.iter().map(|u| (u.clone(), u.clone())).collect();
                self.table.reconcile(class, &seeded);
            }
        }

        // Targets that left the table take their metrics entries along.
        let known: HashSet<String> = self.table.tracked_urls().into_iter().collect();
        self.metrics.prune(&known);
    }

    /// Run discovery until shutdown. The first pass happens immediately.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            classes = self.classes.len(),
            "discovery loop started"
        );
        self.sync_once().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.sync_once().await;
                }
                _ = shutdown.changed() => {
                    info!("discovery loop shutting down");
                    break;
                }
            }
        }
    }
}
