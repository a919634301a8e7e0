//! Byway: a version-aware reverse-proxy gateway.
//!
//! Requests are routed by service name, version range and topology, taken
//! from request headers or from the hostname, against a routing table that
//! hot-reloads from a file or from Redis.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod store;

pub use config::schema::GatewayConfig;
pub use http::ProxyServer;
pub use lifecycle::{Gateway, Shutdown};
pub use routing::{RawRoutingTable, RoutingSnapshot, RoutingTable};
pub use store::RoutingStore;
