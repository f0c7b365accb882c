//! fleet-registry — heartbeat-based service membership.
//!
//! The directory maps service ids to membership records. Workers register
//! on boot, heartbeat periodically, and deregister on shutdown; a
//! background sweep marks records whose heartbeats stopped as unhealthy
//! without deleting them, so a transient network blip never erases
//! membership history.
//!
//! The crate also ships the client side: [`RegistryClient`] for discovery
//! queries (used by the router and monitor) and [`RegistryAgent`], the
//! register/heartbeat/deregister lifecycle a worker embeds.

pub mod agent;
pub mod client;
pub mod directory;
pub mod error;
pub mod server;

pub use agent::{AgentConfig, RegistryAgent};
pub use client::RegistryClient;
pub use directory::{run_sweeper, ServiceDirectory};
pub use error::{RegistryError, RegistryResult};
pub use server::build_router;
