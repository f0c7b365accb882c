//! Request metrics — per-target counters with a sliding rate window.
//!
//! Counters are atomics; the 60-second timestamp window sits behind a
//! mutex per entry. An aggregate entry under [`SELF_KEY`] tracks the
//! router's own throughput across all classes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Key of the router's aggregate self entry.
pub const SELF_KEY: &str = "router";

const WINDOW: Duration = Duration::from_secs(60);

struct TargetMetrics {
    name: String,
    service_type: String,
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    recent: Mutex<VecDeque<Instant>>,
}

impl TargetMetrics {
    fn new(name: &str, service_type: &str) -> Self {
        Self {
            name: name.to_string(),
            service_type: service_type.to_string(),
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    fn record(&self, ok: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if ok {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let now = Instant::now();
        let mut recent = self.recent.lock().expect("window lock");
        while recent
            .front()
            .is_some_and(|t| now.duration_since(*t) >= WINDOW)
        {
            recent.pop_front();
        }
        recent.push_back(now);
    }

    fn requests_per_second(&self) -> f64 {
        let now = Instant::now();
        let mut recent = self.recent.lock().expect("window lock");
        while recent
            .front()
            .is_some_and(|t| now.duration_since(*t) >= WINDOW)
        {
            recent.pop_front();
        }
        recent.len() as f64 / WINDOW.as_secs_f64()
    }
}

/// One entry in the metrics snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub url: String,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub requests_per_second: f64,
    pub success_rate: f64,
}

/// Per-url request metrics, keyed by target url.
#[derive(Clone)]
pub struct MetricsBook {
    entries: Arc<RwLock<HashMap<String, Arc<TargetMetrics>>>>,
}

impl MetricsBook {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record one dispatch outcome for a target.
    pub fn record(&self, url: &str, name: &str, service_type: &str, ok: bool) {
        let entry = self.entry(url, name, service_type);
        entry.record(ok);
    }

    /// Record one inbound request against the router's own counter.
    pub fn record_self(&self, ok: bool) {
        let entry = self.entry(SELF_KEY, "Fleet Router", "router");
        entry.record(ok);
    }

    fn entry(&self, url: &str, name: &str, service_type: &str) -> Arc<TargetMetrics> {
        {
            let entries = self.entries.read().expect("entries lock");
            if let Some(entry) = entries.get(url) {
                return entry.clone();
            }
        }
        let mut entries = self.entries.write().expect("entries lock");
        entries
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(TargetMetrics::new(name, service_type)))
            .clone()
    }

    /// Snapshot every entry with derived rates.
    pub fn snapshot(&self) -> HashMap<String, MetricsEntry> {
        let entries = self.entries.read().expect("entries lock");
        entries
            .iter()
            .map(|(url, m)| {
                let total = m.total.load(Ordering::Relaxed);
                let success = m.success.load(Ordering::Relaxed);
                let success_rate = if total > 0 {
                    round2(success as f64 / total as f64 * 100.0)
                } else {
                    0.0
                };
                (
                    url.clone(),
                    MetricsEntry {
                        name: m.name.clone(),
                        service_type: m.service_type.clone(),
                        url: url.clone(),
                        total,
                        success,
                        failed: m.failed.load(Ordering::Relaxed),
                        requests_per_second: round2(m.requests_per_second()),
                        success_rate,
                    },
                )
            })
            .collect()
    }

    /// Drop entries for urls no longer tracked. The self entry survives.
    pub fn prune(&self, known: &HashSet<String>) {
        let mut entries = self.entries.write().expect("entries lock");
        entries.retain(|url, _| url == SELF_KEY || known.contains(url));
    }
}

impl Default for MetricsBook {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
