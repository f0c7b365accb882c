//! Cooldown-gated alerting.
//!
//! One alert of a given kind per target per cooldown window; the
//! cooldown map is the sole guard against alert storms. Delivery is
//! structured log output and is best-effort by design: a failed or
//! suppressed alert never touches health tracking.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::health::HealthRecord;

/// The three alert kinds the monitor raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    Failure,
    Recovery,
    SlowResponse,
}

/// Rate-limited alert dispatcher.
#[derive(Clone)]
pub struct Alerter {
    cooldowns: Arc<Mutex<HashMap<(String, AlertKind), Instant>>>,
    period: Duration,
}

impl Alerter {
    pub fn new(period: Duration) -> Self {
        Self {
            cooldowns: Arc::new(Mutex::new(HashMap::new())),
            period,
        }
    }

    /// Consult the cooldown and, when clear, claim the slot.
    ///
    /// Returns whether the caller may emit. The slot is recorded at the
    /// same time so two concurrent callers cannot both pass.
    fn begin(&self, url: &str, kind: AlertKind) -> bool {
        let mut cooldowns = self.cooldowns.lock().expect("cooldown lock");
        let key = (url.to_string(), kind);
        match cooldowns.get(&key) {
            Some(last) if last.elapsed() <= self.period => false,
            _ => {
                cooldowns.insert(key, Instant::now());
                true
            }
        }
    }

    /// Critical alert: a target crossed the failure threshold.
    ///
    /// Returns whether the alert was actually delivered.
    pub fn failure(&self, record: &HealthRecord, reason: &str) -> bool {
        if !self.begin(&record.url, AlertKind::Failure) {
            return false;
        }
        error!(
            alert = "SERVICE_FAILURE",
            severity = "CRITICAL",
            service = %record.name,
            service_type = %record.service_type,
            url = %record.url,
            consecutive_failures = record.consecutive_failures,
            %reason,
            "service is down"
        );
        true
    }

    /// Info alert: a previously failed target answered again.
    pub fn recovery(&self, record: &HealthRecord) -> bool {
        if !self.begin(&record.url, AlertKind::Recovery) {
            return false;
        }
        info!(
            alert = "SERVICE_RECOVERY",
            severity = "INFO",
            service = %record.name,
            service_type = %record.service_type,
            url = %record.url,
            uptime_pct = record.uptime_pct,
            "service recovered"
        );
        true
    }

    /// Warning alert: a healthy target is answering slowly.
    pub fn slow_response(&self, record: &HealthRecord, response_time_ms: u64) -> bool {
        if !self.begin(&record.url, AlertKind::SlowResponse) {
            return false;
        }
        warn!(
            alert = "SLOW_RESPONSE",
            severity = "WARNING",
            service = %record.name,
            service_type = %record.service_type,
            url = %record.url,
            response_time_ms,
            "slow response"
        );
        true
    }

    /// Drop cooldown entries for targets no longer tracked.
    pub fn prune(&self, known: &HashSet<String>) {
        let mut cooldowns = self.cooldowns.lock().expect("cooldown lock");
        cooldowns.retain(|(url, _), _| known.contains(url));
    }

    #[cfg(test)]
    fn backdate(&self, url: &str, kind: AlertKind, by: Duration) {
        let mut cooldowns = self.cooldowns.lock().expect("cooldown lock");
        if let Some(at) = cooldowns.get_mut(&(url.to_string(), kind)) {
            *at = Instant::now() - by;
        }
    }
}
