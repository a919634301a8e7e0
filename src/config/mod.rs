//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! byway.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → passed to server, store and admin at startup
//! ```
//!
//! # Design Decisions
//! - Gateway settings are static; only the routing table hot-reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig, RoutingConfig,
    SourceConfig, TimeoutConfig, UnroutedPolicy,
};
