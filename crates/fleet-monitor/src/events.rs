//! Broadcast events pushed to observers.
//!
//! Every state transition and periodic summary goes through the
//! [`EventHub`]; connected observers drain it over WebSocket. Sending is
//! best-effort: with no observers (or a lagging one) the event is simply
//! dropped.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::broadcast;

use fleet_core::epoch_ms;

use crate::correlate::MirroredEntry;
use crate::health::{HealthRecord, Summary};

const CHANNEL_CAPACITY: usize = 256;

/// One observer-facing event. The `event` tag matches the wire names of
/// the push surface.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum MonitorEvent {
    HealthUpdate {
        service: HealthRecord,
        timestamp: u64,
    },
    ServiceRecovery {
        service: HealthRecord,
        timestamp: u64,
    },
    SlowResponse {
        service: HealthRecord,
        response_time_ms: u64,
        timestamp: u64,
    },
    ServiceFailure {
        service: HealthRecord,
        error: String,
        timestamp: u64,
    },
    HealthSummary {
        summary: Summary,
        services: HashMap<String, Vec<HealthRecord>>,
        request_metrics: HashMap<String, MirroredEntry>,
        timestamp: u64,
    },
    RequestEvent {
        url: String,
        name: String,
        service_type: String,
        status: RequestStatus,
        timestamp: u64,
    },
    RequestMetrics {
        metrics: HashMap<String, MirroredEntry>,
        timestamp: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Success,
    Failed,
}

impl MonitorEvent {
    pub fn health_update(service: HealthRecord) -> Self {
        Self::HealthUpdate {
            service,
            timestamp: epoch_ms(),
        }
    }

    pub fn recovery(service: HealthRecord) -> Self {
        Self::ServiceRecovery {
            service,
            timestamp: epoch_ms(),
        }
    }

    pub fn slow_response(service: HealthRecord, response_time_ms: u64) -> Self {
        Self::SlowResponse {
            service,
            response_time_ms,
            timestamp: epoch_ms(),
        }
    }

    pub fn failure(service: HealthRecord, error: impl Into<String>) -> Self {
        Self::ServiceFailure {
            service,
            error: error.into(),
            timestamp: epoch_ms(),
        }
    }

    pub fn summary(
        summary: Summary,
        services: HashMap<String, Vec<HealthRecord>>,
        request_metrics: HashMap<String, MirroredEntry>,
    ) -> Self {
        Self::HealthSummary {
            summary,
            services,
            request_metrics,
            timestamp: epoch_ms(),
        }
    }
}

/// Fan-out channel for monitor events.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Push an event to all observers. Never blocks, never fails.
    pub fn emit(&self, event: MonitorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::HealthState;

    fn record() -> HealthRecord {
        HealthRecord {
            name: "Auth 1".to_string(),
            service_type: "auth".to_string(),
            url: "http://127.0.0.1:3001".to_string(),
            status: HealthState::Healthy,
            consecutive_failures: 0,
            last_check: Some(1000),
            last_success: Some(1000),
            response_time_ms: Some(12),
            total_checks: 1,
            successful_checks: 1,
            uptime_pct: 100.0,
        }
    }

    #[test]
    fn emit_without_observers_is_fine() {
        let hub = EventHub::new();
        hub.emit(MonitorEvent::health_update(record()));
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test]
    async fn observers_receive_events() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();

        hub.emit(MonitorEvent::recovery(record()));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, MonitorEvent::ServiceRecovery { .. }));
    }

    #[test]
    fn wire_tags_match_the_push_surface() {
        let json = serde_json::to_value(MonitorEvent::failure(record(), "refused")).unwrap();
        assert_eq!(json["event"], "service-failure");
        assert_eq!(json["service"]["type"], "auth");
        assert!(json["timestamp"].as_u64().is_some());

        let json = serde_json::to_value(MonitorEvent::slow_response(record(), 1500)).unwrap();
        assert_eq!(json["event"], "slow-response");
        assert_eq!(json["responseTimeMs"], 1500);

        let json = serde_json::to_value(MonitorEvent::RequestEvent {
            url: "http://x".to_string(),
            name: "X".to_string(),
            service_type: "auth".to_string(),
            status: RequestStatus::Success,
            timestamp: 1,
        })
        .unwrap();
        assert_eq!(json["event"], "request-event");
        assert_eq!(json["status"], "success");
        assert_eq!(json["serviceType"], "auth");
    }
}
