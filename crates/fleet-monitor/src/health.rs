//! Per-target health state machine and uptime accounting.
//!
//! Targets move `unknown → healthy/unhealthy` strictly through probe
//! results. A failure only flips the state once the consecutive-failure
//! count reaches the alert threshold; a single success recovers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::debug;

use fleet_core::{epoch_ms, HealthState};

/// Identity of one monitored target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub name: String,
    pub service_type: String,
    pub url: String,
}

/// Tracked state of one monitored target.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub url: String,
    pub status: HealthState,
    pub consecutive_failures: u32,
    pub last_check: Option<u64>,
    pub last_success: Option<u64>,
    pub response_time_ms: Option<u64>,
    pub total_checks: u64,
    pub successful_checks: u64,
    pub uptime_pct: f64,
}

impl HealthRecord {
    fn new(spec: &TargetSpec) -> Self {
        Self {
            name: spec.name.clone(),
            service_type: spec.service_type.clone(),
            url: spec.url.clone(),
            status: HealthState::Unknown,
            consecutive_failures: 0,
            last_check: None,
            last_success: None,
            response_time_ms: None,
            total_checks: 0,
            successful_checks: 0,
            uptime_pct: 0.0,
        }
    }

    fn recompute_uptime(&mut self) {
        self.uptime_pct = if self.total_checks > 0 {
            round2(self.successful_checks as f64 / self.total_checks as f64 * 100.0)
        } else {
            0.0
        };
    }
}

/// What a successful probe caused.
#[derive(Debug, Clone, Copy)]
pub struct SuccessOutcome {
    /// The target transitioned out of `unhealthy`.
    pub recovered: bool,
    /// Latency exceeded the slow-response threshold.
    pub slow: bool,
}

/// What a failed probe caused.
#[derive(Debug, Clone, Copy)]
pub struct FailureOutcome {
    /// Consecutive failures reached the alert threshold (holds on every
    /// failure past it, not only the crossing one).
    pub alertable: bool,
    /// This failure flipped the state to `unhealthy`.
    pub became_unhealthy: bool,
}

/// Per-class counts for the summary payload.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCounts {
    pub total: u32,
    pub healthy: u32,
    pub unhealthy: u32,
}

/// Fleet-wide health summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub timestamp: u64,
    pub total: u32,
    pub healthy: u32,
    pub unhealthy: u32,
    pub unknown: u32,
    pub services: HashMap<String, ClassCounts>,
}

/// Owned store of health records, one per tracked target.
#[derive(Clone)]
pub struct HealthLedger {
    records: Arc<RwLock<HashMap<String, HealthRecord>>>,
    alert_threshold: u32,
    slow_threshold_ms: u64,
}

impl HealthLedger {
    pub fn new(alert_threshold: u32, slow_threshold_ms: u64) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            alert_threshold,
            slow_threshold_ms,
        }
    }

    /// Replace the tracked target set.
    ///
    /// New targets start `unknown`; targets no longer in the set are
    /// dropped from tracking entirely.
    pub fn sync_targets(&self, targets: &[TargetSpec]) {
        let mut records = self.records.write().expect("records lock");
        for spec in targets {
            records
                .entry(spec.url.clone())
                .and_modify(|r| {
                    r.name = spec.name.clone();
                    r.service_type = spec.service_type.clone();
                })
                .or_insert_with(|| {
                    debug!(url = %spec.url, "tracking new target");
                    HealthRecord::new(spec)
                });
        }
        records.retain(|url, _| targets.iter().any(|t| &t.url == url));
    }

    pub fn targets(&self) -> Vec<TargetSpec> {
        let records = self.records.read().expect("records lock");
        records
            .values()
            .map(|r| TargetSpec {
                name: r.name.clone(),
                service_type: r.service_type.clone(),
                url: r.url.clone(),
            })
            .collect()
    }

    pub fn tracked_urls(&self) -> HashSet<String> {
        let records = self.records.read().expect("records lock");
        records.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().expect("records lock").is_empty()
    }

    /// Apply a successful probe. Returns `None` for untracked urls.
    pub fn apply_success(&self, url: &str, latency_ms: u64) -> Option<SuccessOutcome> {
        let mut records = self.records.write().expect("records lock");
        let record = records.get_mut(url)?;

        let was_unhealthy = record.status == HealthState::Unhealthy;
        let now = epoch_ms();
        record.status = HealthState::Healthy;
        record.consecutive_failures = 0;
        record.last_check = Some(now);
        record.last_success = Some(now);
        record.response_time_ms = Some(latency_ms);
        record.total_checks += 1;
        record.successful_checks += 1;
        record.recompute_uptime();

        Some(SuccessOutcome {
            recovered: was_unhealthy,
            slow: latency_ms > self.slow_threshold_ms,
        })
    }

    /// Apply a failed probe. Returns `None` for untracked urls.
    pub fn apply_failure(&self, url: &str, latency_ms: u64) -> Option<FailureOutcome> {
        let mut records = self.records.write().expect("records lock");
        let record = records.get_mut(url)?;

        record.consecutive_failures += 1;
        record.last_check = Some(epoch_ms());
        record.response_time_ms = Some(latency_ms);
        record.total_checks += 1;
        record.recompute_uptime();

        let alertable = record.consecutive_failures >= self.alert_threshold;
        let became_unhealthy = alertable && record.status != HealthState::Unhealthy;
        if alertable {
            record.status = HealthState::Unhealthy;
        }

        Some(FailureOutcome {
            alertable,
            became_unhealthy,
        })
    }

    pub fn record(&self, url: &str) -> Option<HealthRecord> {
        let records = self.records.read().expect("records lock");
        records.get(url).cloned()
    }

    /// Records grouped by service class.
    pub fn by_class(&self) -> HashMap<String, Vec<HealthRecord>> {
        let records = self.records.read().expect("records lock");
        let mut grouped: HashMap<String, Vec<HealthRecord>> = HashMap::new();
        for record in records.values() {
            grouped
                .entry(record.service_type.clone())
                .or_default()
                .push(record.clone());
        }
        grouped
    }

    /// Records of one class, `None` when the class is not tracked.
    pub fn class(&self, service_type: &str) -> Option<Vec<HealthRecord>> {
        let grouped = self.by_class();
        grouped.get(service_type).cloned()
    }

    pub fn summary(&self) -> Summary {
        let records = self.records.read().expect("records lock");
        let mut summary = Summary {
            timestamp: epoch_ms(),
            total: records.len() as u32,
            healthy: 0,
            unhealthy: 0,
            unknown: 0,
            services: HashMap::new(),
        };

        for record in records.values() {
            let counts = summary
                .services
                .entry(record.service_type.clone())
                .or_default();
            counts.total += 1;
            match record.status {
                HealthState::Healthy => {
                    summary.healthy += 1;
                    counts.healthy += 1;
                }
                HealthState::Unhealthy => {
                    summary.unhealthy += 1;
                    counts.unhealthy += 1;
                }
                HealthState::Unknown => summary.unknown += 1,
            }
        }
        summary
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
