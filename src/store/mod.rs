//! Routing table storage.
//!
//! # Data Flow
//! ```text
//! file.rs  (YAML/TOML/JSON on disk, notify watcher)  ┐
//!                                                    ├→ RoutingStore::watch → RoutingSnapshot::follow
//! redis.rs (keyspace + byway.update pub/sub)         ┘
//!
//! admin API / byway-ctl → RoutingStore::create_* → change notification → watch
//! ```
//!
//! # Design Decisions
//! - One trait serves as both config source and management sink
//! - Stores are constructed explicitly and passed in; there is no global client
//! - Mutations validate their input before touching storage
//! - A store never compiles tables; that happens in the snapshot

pub mod file;
pub mod redis;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::routing::table::{
    CompileError, EndpointConfig, RawRoutingTable, TableEditError, VersionTable,
};
use crate::routing::{Rewrite, RewriteError, Version, VersionError};

pub use self::file::FileStore;
pub use self::redis::RedisStore;

/// Errors raised by routing stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Edit(#[from] TableEditError),

    #[error(transparent)]
    InvalidRewrite(#[from] RewriteError),

    #[error("invalid version '{version}': {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: VersionError,
    },

    #[error(transparent)]
    InvalidBinding(#[from] CompileError),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("unsupported routing table format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    #[error("failed to encode routing table: {0}")]
    Encode(String),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Source and sink of routing tables.
#[async_trait]
pub trait RoutingStore: Send + Sync {
    /// Read the current table.
    async fn load(&self) -> Result<RawRoutingTable, StoreError>;

    /// Stream of tables: the current one first, then one per change.
    ///
    /// The stream ends when the store can no longer watch; dropping the
    /// receiver stops the watch.
    async fn watch(&self) -> Result<mpsc::UnboundedReceiver<RawRoutingTable>, StoreError>;

    /// Append a rewrite rule.
    async fn create_rewrite(&self, rule: &str) -> Result<(), StoreError>;

    /// Remove the rewrite at `index` if it is exactly `rule`.
    async fn remove_rewrite(&self, index: usize, rule: &str) -> Result<(), StoreError>;

    /// Register a service with no versions. Existing services are untouched.
    async fn create_service(&self, service: &str) -> Result<(), StoreError>;

    /// Bind `service@version` to `endpoint`, registering the service if needed.
    async fn create_binding(
        &self,
        service: &str,
        version: &str,
        endpoint: &EndpointConfig,
    ) -> Result<(), StoreError>;

    /// Pin `service` to `version` inside `topology`.
    async fn add_service_to_topology(
        &self,
        topology: &str,
        service: &str,
        version: &str,
    ) -> Result<(), StoreError>;
}

/// Reject rules that would make the next table fail to compile.
pub fn validate_rule(rule: &str) -> Result<(), StoreError> {
    Rewrite::parse(rule)?;
    Ok(())
}

pub fn validate_version(version: &str) -> Result<(), StoreError> {
    Version::parse(version).map_err(|source| StoreError::InvalidVersion {
        version: version.to_string(),
        source,
    })?;
    Ok(())
}

/// Check a service's full version map the way the table compiler will.
///
/// Catches bad endpoints and keys that normalize to an already bound version.
pub fn validate_service(
    service: &str,
    versions: &BTreeMap<String, EndpointConfig>,
) -> Result<(), StoreError> {
    VersionTable::compile(service, versions)?;
    Ok(())
}

/// Service and topology names end up in hostnames and storage keys.
///
/// Hostnames are matched lowercased, so names are lowercase only.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}
