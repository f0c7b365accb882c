//! Worker-side registry agent.
//!
//! A worker embeds the agent to maintain its membership: register on
//! boot, heartbeat on an interval, deregister (best-effort) on shutdown.
//! If the registry restarts and forgets us, the next heartbeat comes back
//! 404 and the agent re-registers rather than going silent.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use fleet_core::{FetchError, Registration};

use crate::client::RegistryClient;

/// Configuration for the worker agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Registry origin, e.g. `http://127.0.0.1:3005`.
    pub registry_url: String,
    /// This worker's registration payload.
    pub registration: Registration,
    /// Heartbeat cadence.
    pub heartbeat_interval: Duration,
}

impl AgentConfig {
    pub fn new(registry_url: impl Into<String>, registration: Registration) -> Self {
        Self {
            registry_url: registry_url.into(),
            registration,
            heartbeat_interval: Duration::from_secs(10),
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

/// Maintains one worker's registry membership.
pub struct RegistryAgent {
    client: RegistryClient,
    registration: Registration,
    heartbeat_interval: Duration,
}

impl RegistryAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            client: RegistryClient::new(config.registry_url),
            registration: config.registration,
            heartbeat_interval: config.heartbeat_interval,
        }
    }

    pub fn service_id(&self) -> &str {
        &self.registration.service_id
    }

    /// Register with the registry.
    pub async fn register(&self) -> Result<(), FetchError> {
        let record = self.client.register(&self.registration).await?;
        info!(
            service_id = %record.service_id,
            name = %record.name,
            "registered with registry"
        );
        Ok(())
    }

    /// Send one heartbeat, re-registering if the registry forgot us.
    pub async fn heartbeat(&self) -> Result<(), FetchError> {
        match self.client.heartbeat(&self.registration.service_id).await {
            Ok(()) => {
                debug!(service_id = %self.registration.service_id, "heartbeat sent");
                Ok(())
            }
            Err(e) if e.status() == Some(404) => {
                warn!(
                    service_id = %self.registration.service_id,
                    "registry lost our record, re-registering"
                );
                self.register().await
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort removal of our record.
    pub async fn deregister(&self) {
        match self.client.deregister(&self.registration.service_id).await {
            Ok(()) => info!(
                service_id = %self.registration.service_id,
                "deregistered from registry"
            ),
            Err(e) => warn!(
                service_id = %self.registration.service_id,
                error = %e,
                "deregister failed"
            ),
        }
    }

    /// Run the heartbeat loop until shutdown, then deregister.
    ///
    /// Heartbeat failures are logged and retried on the next tick; a
    /// worker never exits because the registry is momentarily away.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            service_id = %self.registration.service_id,
            interval_ms = self.heartbeat_interval.as_millis() as u64,
            "heartbeat loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.heartbeat_interval) => {
                    if let Err(e) = self.heartbeat().await {
                        warn!(
                            service_id = %self.registration.service_id,
                            error = %e,
                            "heartbeat failed"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    info!(
                        service_id = %self.registration.service_id,
                        "heartbeat loop shutting down"
                    );
                    break;
                }
            }
        }

        self.deregister().await;
    }
}
