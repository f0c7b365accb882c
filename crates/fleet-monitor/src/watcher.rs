//! The check cycle — fan-out probes, state updates, alerts, summary.
//!
//! Each cycle re-syncs the tracked target set (registry-backed when
//! configured), probes every target concurrently, applies results to the
//! ledger as they resolve, and broadcasts a summary once the whole set
//! has settled. A hung target delays only the summary, never another
//! target's update.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use fleet_core::{FetchClient, ServiceFilter};
use fleet_registry::RegistryClient;

use crate::alerts::Alerter;
use crate::correlate::MetricsMirror;
use crate::events::{EventHub, MonitorEvent};
use crate::health::{HealthLedger, TargetSpec};

/// Watcher wiring.
pub struct WatcherConfig {
    /// Registry origin for dynamic target discovery; `None` keeps the
    /// static target set.
    pub registry_url: Option<String>,
    /// Static seed targets, also the fallback when the registry is
    /// unreachable before anything was tracked.
    pub static_targets: Vec<TargetSpec>,
    pub check_interval: Duration,
    pub probe_timeout: Duration,
}

/// Runs the periodic health check cycle.
pub struct Watcher {
    ledger: HealthLedger,
    alerter: Alerter,
    hub: EventHub,
    mirror: MetricsMirror,
    client: FetchClient,
    registry: Option<RegistryClient>,
    static_targets: Vec<TargetSpec>,
    check_interval: Duration,
    probe_timeout: Duration,
}

impl Watcher {
    pub fn new(
        ledger: HealthLedger,
        alerter: Alerter,
        hub: EventHub,
        mirror: MetricsMirror,
        config: WatcherConfig,
    ) -> Self {
        Self {
            ledger,
            alerter,
            hub,
            mirror,
            client: FetchClient::new(),
            registry: config.registry_url.map(RegistryClient::new),
            static_targets: config.static_targets,
            check_interval: config.check_interval,
            probe_timeout: config.probe_timeout,
        }
    }

    /// Bring the tracked target set up to date.
    ///
    /// Registry-backed when configured; a failed registry call keeps the
    /// current set, falling back to the static seeds only while nothing
    /// is tracked yet.
    async fn sync_targets(&self) {
        let Some(registry) = &self.registry else {
            if self.ledger.is_empty() {
                self.ledger.sync_targets(&self.static_targets);
            }
            return;
        };

        match registry.list_services(&ServiceFilter::default()).await {
            Ok(records) => {
                let targets: Vec<TargetSpec> = records
                    .into_iter()
                    .map(|r| TargetSpec {
                        name: r.name,
                        service_type: r.service_type,
                        url: r.url,
                    })
                    .collect();
                self.ledger.sync_targets(&targets);

                let known = self.ledger.tracked_urls();
                self.alerter.prune(&known);
                self.mirror.prune(&known);
            }
            Err(e) => {
                warn!(
                    registry = %registry.base(),
                    error = %e,
                    "target sync failed, keeping tracked set"
                );
                if self.ledger.is_empty() {
                    info!("registry unreachable with nothing tracked, seeding static targets");
                    self.ledger.sync_targets(&self.static_targets);
                }
            }
        }
    }

    /// Probe one target and fold the result into the ledger and the
    /// event stream.
    async fn check_target(&self, target: &TargetSpec) {
        let url = format!("{}/health", target.url);
        let started = Instant::now();
        let result = self.client.probe(&url, self.probe_timeout).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok((status, latency)) if status.is_success() => {
                let latency_ms = latency.as_millis() as u64;
                let Some(outcome) = self.ledger.apply_success(&target.url, latency_ms) else {
                    return;
                };
                let Some(record) = self.ledger.record(&target.url) else {
                    return;
                };

                debug!(url = %target.url, latency_ms, "probe healthy");
                self.hub.emit(MonitorEvent::health_update(record.clone()));

                if outcome.recovered {
                    self.alerter.recovery(&record);
                    self.hub.emit(MonitorEvent::recovery(record.clone()));
                }
                if outcome.slow {
                    self.alerter.slow_response(&record, latency_ms);
                    self.hub
                        .emit(MonitorEvent::slow_response(record, latency_ms));
                }
            }
            other => {
                let reason = match other {
                    Ok((status, _)) => format!("health endpoint returned {status}"),
                    Err(e) => e.to_string(),
                };
                let Some(outcome) = self.ledger.apply_failure(&target.url, elapsed_ms) else {
                    return;
                };
                let Some(record) = self.ledger.record(&target.url) else {
                    return;
                };

                debug!(url = %target.url, %reason, "probe failed");
                self.hub.emit(MonitorEvent::health_update(record.clone()));

                if outcome.alertable {
                    self.alerter.failure(&record, &reason);
                    self.hub.emit(MonitorEvent::failure(record, reason));
                }
            }
        }
    }

    /// One full check cycle: sync, fan-out, barrier, summary.
    pub async fn run_cycle(&self) {
        self.sync_targets().await;

        let targets = self.ledger.targets();
        if targets.is_empty() {
            debug!("no targets tracked, skipping cycle");
            return;
        }

        let checks = targets.iter().map(|target| self.check_target(target));
        futures::future::join_all(checks).await;

        let summary = self.ledger.summary();
        debug!(
            healthy = summary.healthy,
            unhealthy = summary.unhealthy,
            unknown = summary.unknown,
            "check cycle complete"
        );
        self.hub.emit(MonitorEvent::summary(
            summary,
            self.ledger.by_class(),
            self.mirror.snapshot(),
        ));
    }

    /// Run check cycles until shutdown. The first cycle is immediate.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            interval_ms = self.check_interval.as_millis() as u64,
            "check cycle loop started"
        );
        self.run_cycle().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => {
                    info!("check cycle loop shutting down");
                    break;
                }
            }
        }
    }
}
