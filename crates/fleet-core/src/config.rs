//! fleet.toml configuration parser.
//!
//! Every interval and threshold in the control plane is settable here;
//! absent keys fall back to the defaults the components ship with. Bind
//! addresses may additionally be overridden by `fleetd` flags.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Bind address for the registry HTTP surface.
    #[serde(default = "default_registry_bind")]
    pub bind: String,
    /// A record is marked unhealthy when no heartbeat arrives within this.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Stale sweep cadence.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

/// Static seed targets for one service class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassConfig {
    pub name: String,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_router_bind")]
    pub bind: String,
    /// When set, target lists come from the registry; otherwise the
    /// static `class` seeds are the membership.
    #[serde(default)]
    pub registry_url: Option<String>,
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
    #[serde(default = "default_router_probe_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Evict targets that vanish from discovery instead of soft-removing.
    #[serde(default)]
    pub evict_vanished: bool,
    #[serde(default)]
    pub class: Vec<ClassConfig>,
}

/// Static seed target for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub service_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_bind")]
    pub bind: String,
    #[serde(default)]
    pub registry_url: Option<String>,
    /// Router metrics endpoint base for correlation; unset disables it.
    #[serde(default)]
    pub router_url: Option<String>,
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    #[serde(default = "default_monitor_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_slow_response_ms")]
    pub slow_response_threshold_ms: u64,
    #[serde(default = "default_metrics_poll_interval_ms")]
    pub metrics_poll_interval_ms: u64,
    #[serde(default)]
    pub target: Vec<TargetConfig>,
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bind: default_registry_bind(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl RegistryConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bind: default_router_bind(),
            registry_url: None,
            discovery_interval_ms: default_discovery_interval_ms(),
            health_check_interval_ms: default_router_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            failure_threshold: default_failure_threshold(),
            evict_vanished: false,
            class: Vec::new(),
        }
    }
}

impl RouterConfig {
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bind: default_monitor_bind(),
            registry_url: None,
            router_url: None,
            check_interval_ms: default_check_interval_ms(),
            probe_timeout_ms: default_monitor_probe_timeout_ms(),
            alert_threshold: default_alert_threshold(),
            cooldown_ms: default_cooldown_ms(),
            slow_response_threshold_ms: default_slow_response_ms(),
            metrics_poll_interval_ms: default_metrics_poll_interval_ms(),
            target: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn metrics_poll_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_poll_interval_ms)
    }
}

fn default_registry_bind() -> String {
    "0.0.0.0:3005".to_string()
}

fn default_router_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_monitor_bind() -> String {
    "0.0.0.0:3006".to_string()
}

fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}

fn default_sweep_interval_ms() -> u64 {
    10_000
}

fn default_discovery_interval_ms() -> u64 {
    15_000
}

fn default_router_probe_interval_ms() -> u64 {
    10_000
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_check_interval_ms() -> u64 {
    5_000
}

fn default_monitor_probe_timeout_ms() -> u64 {
    5_000
}

fn default_alert_threshold() -> u32 {
    3
}

fn default_cooldown_ms() -> u64 {
    60_000
}

fn default_slow_response_ms() -> u64 {
    1_000
}

fn default_metrics_poll_interval_ms() -> u64 {
    1_000
}
