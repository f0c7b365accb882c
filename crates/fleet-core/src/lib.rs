//! fleet-core — shared foundation for the fleet control plane.
//!
//! Holds what every component needs and nothing more: the domain types
//! exchanged over the wire, the `fleet.toml` configuration model, and a
//! small hyper-based HTTP client where every call carries an explicit
//! timeout.

pub mod config;
pub mod http;
pub mod time;
pub mod types;

pub use config::FleetConfig;
pub use http::{FetchClient, FetchError};
pub use time::epoch_ms;
pub use types::{HealthState, Registration, ServiceFilter, ServiceRecord};
