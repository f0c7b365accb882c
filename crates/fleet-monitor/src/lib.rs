//! fleet-monitor — independent fault detection for the fleet.
//!
//! The monitor probes every tracked target's `/health` on its own timer,
//! runs a per-target state machine with uptime accounting, raises
//! cooldown-gated alerts on failure, recovery, and slow responses, and
//! pushes every transition plus a periodic summary to connected
//! observers over a broadcast channel. It deliberately shares no state
//! with the router: its view of the fleet cannot be skewed by the
//! router's retry and demotion policy.

pub mod alerts;
pub mod correlate;
pub mod events;
pub mod health;
pub mod server;
pub mod watcher;

pub use alerts::{AlertKind, Alerter};
pub use correlate::{MetricsCorrelator, MetricsMirror};
pub use events::{EventHub, MonitorEvent};
pub use health::{HealthLedger, HealthRecord, Summary, TargetSpec};
pub use server::{build_router, MonitorState};
pub use watcher::{Watcher, WatcherConfig};
