//! fleet-router — health-aware load balancing for service classes.
//!
//! The route table holds one target list and one round-robin counter per
//! service class. Dispatch picks the next healthy target, forwards the
//! request, and retries on transport failure; an independent probe loop
//! lets idle targets recover; a discovery loop keeps membership in sync
//! with the registry. Request metrics are tracked per target over a
//! sliding window and exposed read-only.

pub mod discovery;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod proxy;
pub mod server;
pub mod table;

pub use discovery::DiscoverySync;
pub use error::RouterError;
pub use metrics::MetricsBook;
pub use probe::HealthProber;
pub use proxy::{DispatchConfig, Dispatcher};
pub use server::{build_router, RouterState};
pub use table::{RouteTable, RouteTarget};
