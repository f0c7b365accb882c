//! Router metrics correlation.
//!
//! Polls the router's `/metrics` endpoint on a short interval and
//! compares each target's counters against the previous snapshot. A
//! positive delta in `total` becomes a `request-event` broadcast for
//! live visualization; the returned counters are mirrored for the
//! monitor's own metrics surface. Correlation never touches the health
//! state machine.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use fleet_core::{epoch_ms, FetchClient};

use crate::events::{EventHub, MonitorEvent, RequestStatus};

/// The router's aggregate self entry; not a monitored target.
const ROUTER_SELF_KEY: &str = "router";

/// One entry as served by the router's `/metrics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamEntry {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub service_type: String,
    #[serde(default)]
    pub url: String,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    #[serde(default)]
    pub requests_per_second: f64,
    #[serde(default)]
    pub success_rate: f64,
}

#[derive(Debug, Deserialize)]
struct UpstreamMetricsResponse {
    metrics: HashMap<String, UpstreamEntry>,
}

/// A mirrored entry, annotated with when we last saw traffic for it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirroredEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub url: String,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub requests_per_second: f64,
    pub success_rate: f64,
    pub last_request: Option<u64>,
}

/// The monitor's mirror of the router's request metrics.
#[derive(Clone)]
pub struct MetricsMirror {
    entries: Arc<RwLock<HashMap<String, MirroredEntry>>>,
}

impl MetricsMirror {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn snapshot(&self) -> HashMap<String, MirroredEntry> {
        self.entries.read().expect("mirror lock").clone()
    }

    fn apply(&self, url: &str, upstream: &UpstreamEntry, saw_traffic: bool) {
        let mut entries = self.entries.write().expect("mirror lock");
        let entry = entries
            .entry(url.to_string())
            .or_insert_with(|| MirroredEntry {
                name: upstream.name.clone(),
                service_type: upstream.service_type.clone(),
                url: url.to_string(),
                total: 0,
                success: 0,
                failed: 0,
                requests_per_second: 0.0,
                success_rate: 0.0,
                last_request: None,
            });
        entry.name = upstream.name.clone();
        entry.service_type = upstream.service_type.clone();
        entry.total = upstream.total;
        entry.success = upstream.success;
        entry.failed = upstream.failed;
        entry.requests_per_second = upstream.requests_per_second;
        entry.success_rate = upstream.success_rate;
        if saw_traffic {
            entry.last_request = Some(epoch_ms());
        }
    }

    /// Drop entries for urls no longer tracked.
    pub fn prune(&self, known: &HashSet<String>) {
        let mut entries = self.entries.write().expect("mirror lock");
        entries.retain(|url, _| known.contains(url));
    }
}

impl Default for MetricsMirror {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls the router and turns counter deltas into broadcast events.
pub struct MetricsCorrelator {
    client: FetchClient,
    router_base: String,
    mirror: MetricsMirror,
    hub: EventHub,
    previous: Mutex<HashMap<String, UpstreamEntry>>,
    interval: Duration,
    timeout: Duration,
}

impl MetricsCorrelator {
    pub fn new(
        router_base: impl Into<String>,
        mirror: MetricsMirror,
        hub: EventHub,
        interval: Duration,
    ) -> Self {
        Self {
            client: FetchClient::new(),
            router_base: router_base.into().trim_end_matches('/').to_string(),
            mirror,
            hub,
            previous: Mutex::new(HashMap::new()),
            interval,
            timeout: Duration::from_secs(2),
        }
    }

    /// One poll of the router's metrics.
    ///
    /// An unreachable router is a silent skip: the previous snapshot and
    /// the mirror keep their state for the next round.
    pub async fn poll_once(&self) {
        let url = format!("{}/metrics", self.router_base);
        let response: UpstreamMetricsResponse =
            match self.client.get_json(&url, self.timeout).await {
                Ok(resp) => resp,
                Err(e) => {
                    debug!(router = %self.router_base, error = %e, "metrics poll skipped");
                    return;
                }
            };

        let mut previous = self.previous.lock().expect("previous lock");
        for (url, entry) in &response.metrics {
            let prev = previous.get(url).cloned().unwrap_or_default();
            let saw_traffic = entry.total > prev.total;

            if saw_traffic && url != ROUTER_SELF_KEY {
                let status = if entry.success > prev.success {
                    RequestStatus::Success
                } else {
                    RequestStatus::Failed
                };
                self.hub.emit(MonitorEvent::RequestEvent {
                    url: url.clone(),
                    name: entry.name.clone(),
                    service_type: entry.service_type.clone(),
                    status,
                    timestamp: epoch_ms(),
                });
            }

            self.mirror.apply(url, entry, saw_traffic);
        }
        *previous = response.metrics;
        drop(previous);

        self.hub.emit(MonitorEvent::RequestMetrics {
            metrics: self.mirror.snapshot(),
            timestamp: epoch_ms(),
        });
    }

    /// Run the correlation loop until shutdown.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            router = %self.router_base,
            interval_ms = self.interval.as_millis() as u64,
            "metrics correlation started"
        );
        self.poll_once().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.poll_once().await;
                }
                _ = shutdown.changed() => {
                    info!("metrics correlation shutting down");
                    break;
                }
            }
        }
    }
}
