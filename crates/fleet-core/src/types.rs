//! Domain types shared by the registry, router, and monitor.
//!
//! All wire-facing structs serialize with camelCase field names to match
//! the JSON surface in §7 of the design. Timestamps are epoch
//! milliseconds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier a worker registers under.
pub type ServiceId = String;

/// Named category of interchangeable workers ("auth", "data", "compute").
pub type ServiceClass = String;

/// Observed health of a monitored target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Never probed successfully or unsuccessfully.
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// Membership record owned by the registry.
///
/// Created on register, refreshed on heartbeat. The stale sweep only
/// flips `healthy` to false; the record survives until an explicit
/// deregister.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub service_id: ServiceId,
    pub service_type: ServiceClass,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Epoch ms when the record was (last) created.
    pub registered_at: u64,
    /// Epoch ms of the most recent heartbeat.
    pub last_heartbeat: u64,
    pub healthy: bool,
}

/// Fields a worker supplies when registering.
///
/// All four identity fields are required; `metadata` is free-form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub service_id: ServiceId,
    pub service_type: ServiceClass,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Filter for registry listings.
#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    /// Restrict to one service class.
    pub service_type: Option<ServiceClass>,
    /// Restrict by current health flag.
    pub healthy: Option<bool>,
}

impl ServiceFilter {
    pub fn matches(&self, record: &ServiceRecord) -> bool {
        if let Some(ref t) = self.service_type {
            if &record.service_type != t {
                return false;
            }
        }
        if let Some(h) = self.healthy {
            if record.healthy != h {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(service_type: &str, healthy: bool) -> ServiceRecord {
        ServiceRecord {
            service_id: "auth-1".to_string(),
            service_type: service_type.to_string(),
            url: "http://127.0.0.1:3001".to_string(),
            name: "Auth 1".to_string(),
            metadata: HashMap::new(),
            registered_at: 1000,
            last_heartbeat: 1000,
            healthy,
        }
    }

    #[test]
    fn filter_empty_matches_all() {
        let f = ServiceFilter::default();
        assert!(f.matches(&record("auth", true)));
        assert!(f.matches(&record("data", false)));
    }

    #[test]
    fn filter_by_type() {
        let f = ServiceFilter {
            service_type: Some("auth".to_string()),
            healthy: None,
        };
        assert!(f.matches(&record("auth", false)));
        assert!(!f.matches(&record("data", true)));
    }

    #[test]
    fn filter_by_health() {
        let f = ServiceFilter {
            service_type: None,
            healthy: Some(true),
        };
        assert!(f.matches(&record("auth", true)));
        assert!(!f.matches(&record("auth", false)));
    }

    #[test]
    fn record_wire_names_are_camel_case() {
        let json = serde_json::to_value(record("auth", true)).unwrap();
        assert!(json.get("serviceId").is_some());
        assert!(json.get("serviceType").is_some());
        assert!(json.get("lastHeartbeat").is_some());
        assert!(json.get("registeredAt").is_some());
    }

    #[test]
    fn registration_metadata_defaults_empty() {
        let reg: Registration = serde_json::from_str(
            r#"{"serviceId":"a","serviceType":"auth","url":"http://x","name":"A"}"#,
        )
        .unwrap();
        assert!(reg.metadata.is_empty());
    }

    #[test]
    fn health_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&HealthState::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthState::Unknown).unwrap(),
            "\"unknown\""
        );
    }
}
