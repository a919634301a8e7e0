//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Raw table (config source)
//!     → table.rs (compile: rewrites, version tables, topologies)
//!     → snapshot.rs (atomic publish)
//!
//! Incoming request (host, headers)
//!     → rewrite.rs (normalize URL to a fixed point)
//!     → params.rs (topology, min/max version, service)
//!     → topology.rs (pinned version?) / version.rs (constraint match)
//!     → Resolution (binding) or no match
//! ```
//!
//! # Design Decisions
//! - Tables compiled once per update, immutable afterwards
//! - Deterministic: same table and request always resolve the same binding
//! - Highest satisfying version wins

pub mod params;
pub mod rewrite;
pub mod snapshot;
pub mod table;
pub mod topology;
pub mod version;

pub use params::RoutingParams;
pub use rewrite::{Rewrite, RewriteChain, RewriteError};
pub use snapshot::RoutingSnapshot;
pub use table::{
    Binding, CompileError, EndpointConfig, RawRoutingTable, Resolution, ResolvedBy, RoutingTable,
    Scheme,
};
pub use topology::TopologyTable;
pub use version::{Constraint, Version, VersionError};
