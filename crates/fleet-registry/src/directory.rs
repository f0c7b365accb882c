//! Membership directory — the registry's owned store.
//!
//! A single map of service id → record behind an `RwLock`. All state is
//! in-memory and process-lifetime; a restart rebuilds membership from the
//! workers' next registrations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use fleet_core::{epoch_ms, Registration, ServiceFilter, ServiceRecord};

use crate::error::{RegistryError, RegistryResult};

/// Heartbeat-based membership directory.
///
/// Cheap to clone; clones share the same underlying map.
#[derive(Clone)]
pub struct ServiceDirectory {
    services: Arc<RwLock<HashMap<String, ServiceRecord>>>,
    heartbeat_timeout: Duration,
}

impl ServiceDirectory {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
            heartbeat_timeout,
        }
    }

    /// Create or overwrite a membership record.
    ///
    /// Registering an existing id replaces the record in place and
    /// restarts its heartbeat clock.
    pub fn register(&self, reg: Registration) -> RegistryResult<ServiceRecord> {
        validate(&reg)?;

        let now = epoch_ms();
        let record = ServiceRecord {
            service_id: reg.service_id.clone(),
            service_type: reg.service_type,
            url: reg.url,
            name: reg.name,
            metadata: reg.metadata,
            registered_at: now,
            last_heartbeat: now,
            healthy: true,
        };

        let mut services = self.services.write().expect("services lock");
        services.insert(reg.service_id.clone(), record.clone());
        info!(
            service_id = %record.service_id,
            name = %record.name,
            url = %record.url,
            total = services.len(),
            "service registered"
        );
        Ok(record)
    }

    /// Refresh a record's heartbeat and mark it healthy again.
    pub fn heartbeat(&self, service_id: &str) -> RegistryResult<()> {
        let mut services = self.services.write().expect("services lock");
        let record = services
            .get_mut(service_id)
            .ok_or_else(|| RegistryError::NotFound(service_id.to_string()))?;
        record.last_heartbeat = epoch_ms();
        record.healthy = true;
        debug!(%service_id, "heartbeat received");
        Ok(())
    }

    /// Remove a record. Success (returning false) when it was absent.
    pub fn deregister(&self, service_id: &str) -> bool {
        let mut services = self.services.write().expect("services lock");
        let removed = services.remove(service_id);
        if let Some(record) = &removed {
            info!(
                %service_id,
                name = %record.name,
                total = services.len(),
                "service deregistered"
            );
        }
        removed.is_some()
    }

    /// Snapshot of all records matching the filter. No ordering guarantee.
    pub fn list(&self, filter: &ServiceFilter) -> Vec<ServiceRecord> {
        let services = self.services.read().expect("services lock");
        services
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    pub fn get(&self, service_id: &str) -> RegistryResult<ServiceRecord> {
        let services = self.services.read().expect("services lock");
        services
            .get(service_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(service_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.services.read().expect("services lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark records whose heartbeat is older than the timeout as
    /// unhealthy. Records are never deleted here, only on deregister.
    ///
    /// Returns the ids that were newly marked stale.
    pub fn mark_stale(&self) -> Vec<String> {
        let now = epoch_ms();
        let timeout_ms = self.heartbeat_timeout.as_millis() as u64;
        let mut stale = Vec::new();

        let mut services = self.services.write().expect("services lock");
        for record in services.values_mut() {
            if record.healthy && now.saturating_sub(record.last_heartbeat) > timeout_ms {
                record.healthy = false;
                warn!(
                    service_id = %record.service_id,
                    name = %record.name,
                    last_heartbeat = record.last_heartbeat,
                    "service marked stale"
                );
                stale.push(record.service_id.clone());
            }
        }
        stale
    }

    #[cfg(test)]
    fn set_last_heartbeat(&self, service_id: &str, at: u64) {
        let mut services = self.services.write().expect("services lock");
        if let Some(record) = services.get_mut(service_id) {
            record.last_heartbeat = at;
        }
    }
}

fn validate(reg: &Registration) -> RegistryResult<()> {
    let mut missing = Vec::new();
    if reg.service_id.is_empty() {
        missing.push("serviceId");
    }
    if reg.service_type.is_empty() {
        missing.push("serviceType");
    }
    if reg.url.is_empty() {
        missing.push("url");
    }
    if reg.name.is_empty() {
        missing.push("name");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::Validation(missing.join(", ")))
    }
}

/// Run the stale sweep until the shutdown signal flips.
pub async fn run_sweeper(
    directory: ServiceDirectory,
    interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "stale sweep started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let stale = directory.mark_stale();
                if !stale.is_empty() {
                    info!(count = stale.len(), "sweep marked services unhealthy");
                }
            }
            _ = shutdown.changed() => {
                info!("stale sweep shutting down");
                break;
            }
        }
    }
}
