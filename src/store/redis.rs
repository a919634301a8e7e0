//! Redis-backed routing store.
//!
//! ## Key Layout
//!
//! ```text
//! byway.rewrite              LIST  rewrite rules, in order
//! byway.service_index        SET   service names
//! byway.service.<name>       HASH  version → JSON endpoint
//! byway.topology.<key>       HASH  service → pinned version
//! byway.update               channel, published after every mutation
//! ```
//!
//! Every gateway instance subscribed to `byway.update` re-reads the whole
//! table on each message, so instances converge on the same table.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::routing::table::{EndpointConfig, RawRoutingTable, TableEditError};
use crate::store::{
    validate_name, validate_rule, validate_service, validate_version, RoutingStore, StoreError,
};

pub const REWRITE_KEY: &str = "byway.rewrite";
pub const SERVICE_INDEX_KEY: &str = "byway.service_index";
pub const SERVICE_KEY_PREFIX: &str = "byway.service.";
pub const TOPOLOGY_KEY_PREFIX: &str = "byway.topology.";
pub const UPDATE_CHANNEL: &str = "byway.update";

/// Tombstone written over a rewrite before it is removed by value.
const DELETED_MARKER: &str = ":DEL:";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Reconnect delay: doubles per failure, back to the start once subscribed.
#[derive(Debug)]
struct Backoff {
    current: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            current: INITIAL_BACKOFF,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX_BACKOFF);
        delay
    }

    fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

pub fn service_key(service: &str) -> String {
    format!("{SERVICE_KEY_PREFIX}{service}")
}

pub fn topology_key(topology: &str) -> String {
    format!("{TOPOLOGY_KEY_PREFIX}{topology}")
}

/// Routing store backed by a Redis keyspace.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/9`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        tracing::info!(url = %url, "Connected to redis routing store");
        Ok(Self { client, conn })
    }

    async fn notify(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(UPDATE_CHANNEL, "go").await?;
        Ok(())
    }

    /// Subscribe once and forward a fresh table per message.
    ///
    /// Returns `Ok(())` when the receiver is gone, `Err` when the
    /// subscription breaks.
    async fn follow_updates(
        &self,
        tx: &mpsc::UnboundedSender<RawRoutingTable>,
        backoff: &mut Backoff,
    ) -> Result<(), StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(UPDATE_CHANNEL).await?;
        tracing::info!(channel = UPDATE_CHANNEL, "Subscribed to routing table updates");

        // Catch up on anything published while we were disconnected.
        if tx.send(self.load().await?).is_err() {
            return Ok(());
        }
        backoff.reset();

        let mut messages = pubsub.on_message();
        while messages.next().await.is_some() {
            let table = self.load().await?;
            tracing::debug!(services = table.services.len(), "Routing table update received");
            if tx.send(table).is_err() {
                return Ok(());
            }
        }
        Err(StoreError::Redis(
            (::redis::ErrorKind::IoError, "subscription closed").into(),
        ))
    }
}

fn decode_endpoints(
    service: &str,
    raw: HashMap<String, String>,
) -> Result<BTreeMap<String, EndpointConfig>, StoreError> {
    raw.into_iter()
        .map(|(version, json)| {
            serde_json::from_str(&json)
                .map(|endpoint| (version.clone(), endpoint))
                .map_err(|e| StoreError::Decode {
                    what: format!("{}[{}]", service_key(service), version),
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// The service's versions as they would be after binding `version`.
fn staged_versions(
    service: &str,
    stored: HashMap<String, String>,
    version: &str,
    endpoint: &EndpointConfig,
) -> Result<BTreeMap<String, EndpointConfig>, StoreError> {
    let mut versions = decode_endpoints(service, stored)?;
    versions.insert(version.to_string(), endpoint.clone());
    validate_service(service, &versions)?;
    Ok(versions)
}

#[async_trait]
impl RoutingStore for RedisStore {
    async fn load(&self) -> Result<RawRoutingTable, StoreError> {
        let mut conn = self.conn.clone();
        let mut table = RawRoutingTable::new();

        table.rewrites = conn.lrange(REWRITE_KEY, 0, -1).await?;

        let services: HashSet<String> = conn.smembers(SERVICE_INDEX_KEY).await?;
        for service in services {
            let raw: HashMap<String, String> = conn.hgetall(service_key(&service)).await?;
            let endpoints = decode_endpoints(&service, raw)?;
            table.services.insert(service, endpoints);
        }

        let keys: Vec<String> = ::redis::cmd("KEYS")
            .arg(format!("{TOPOLOGY_KEY_PREFIX}*"))
            .query_async(&mut conn)
            .await?;
        for key in keys {
            let Some(topology) = key.strip_prefix(TOPOLOGY_KEY_PREFIX) else {
                continue;
            };
            let pins: HashMap<String, String> = conn.hgetall(&key).await?;
            table
                .topologies
                .insert(topology.to_string(), pins.into_iter().collect());
        }

        Ok(table)
    }

    async fn watch(&self) -> Result<mpsc::UnboundedReceiver<RawRoutingTable>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(self.load().await?).ok();

        let store = self.clone();
        tokio::spawn(async move {
            let mut backoff = Backoff::new();
            loop {
                match store.follow_updates(&tx, &mut backoff).await {
                    Ok(()) => break,
                    Err(e) => {
                        if tx.is_closed() {
                            break;
                        }
                        let delay = backoff.next_delay();
                        tracing::error!(
                            error = %e,
                            backoff_secs = delay.as_secs(),
                            "Routing table subscription lost, reconnecting"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
            tracing::debug!("Redis routing table watcher stopped");
        });

        Ok(rx)
    }

    async fn create_rewrite(&self, rule: &str) -> Result<(), StoreError> {
        validate_rule(rule)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(REWRITE_KEY, rule).await?;
        self.notify().await
    }

    async fn remove_rewrite(&self, index: usize, rule: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(REWRITE_KEY).await?;
        let position = isize::try_from(index).unwrap_or(isize::MAX);
        let found: Option<String> = conn.lindex(REWRITE_KEY, position).await?;

        let found = found.ok_or(TableEditError::RewriteIndexOutOfRange { index, len })?;
        if found != rule {
            return Err(TableEditError::RewriteMismatch {
                index,
                expected: rule.to_string(),
                found,
            }
            .into());
        }

        let _: () = ::redis::pipe()
            .atomic()
            .lset(REWRITE_KEY, position, DELETED_MARKER)
            .ignore()
            .lrem(REWRITE_KEY, 1, DELETED_MARKER)
            .ignore()
            .query_async(&mut conn)
            .await?;
        self.notify().await
    }

    async fn create_service(&self, service: &str) -> Result<(), StoreError> {
        validate_name(service)?;
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(SERVICE_INDEX_KEY, service).await?;
        self.notify().await
    }

    async fn create_binding(
        &self,
        service: &str,
        version: &str,
        endpoint: &EndpointConfig,
    ) -> Result<(), StoreError> {
        validate_name(service)?;
        validate_version(version)?;
        if let Some(rule) = &endpoint.rewrite {
            validate_rule(rule)?;
        }
        let json = serde_json::to_string(endpoint).map_err(|e| StoreError::Encode(e.to_string()))?;

        let mut conn = self.conn.clone();
        let stored: HashMap<String, String> = conn.hgetall(service_key(service)).await?;
        staged_versions(service, stored, version, endpoint)?;

        let _: () = ::redis::pipe()
            .atomic()
            .sadd(SERVICE_INDEX_KEY, service)
            .ignore()
            .hset(service_key(service), version, json)
            .ignore()
            .query_async(&mut conn)
            .await?;
        self.notify().await
    }

    async fn add_service_to_topology(
        &self,
        topology: &str,
        service: &str,
        version: &str,
    ) -> Result<(), StoreError> {
        validate_name(topology)?;
        validate_name(service)?;
        validate_version(version)?;
        let mut conn = self.conn.clone();
        let _: () = conn.hset(topology_key(topology), service, version).await?;
        self.notify().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(service_key("search"), "byway.service.search");
        assert_eq!(topology_key("blue"), "byway.topology.blue");
    }

    #[test]
    fn test_backoff_doubles_caps_and_resets() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), MAX_BACKOFF);

        backoff.reset();
        assert_eq!(backoff.next_delay(), INITIAL_BACKOFF);
    }

    #[test]
    fn test_staged_versions_reject_uncompilable_bindings() {
        let stored = HashMap::from([(
            "1.0.0".to_string(),
            r#"{"host":"localhost:8081"}"#.to_string(),
        )]);

        let staged =
            staged_versions("search", stored.clone(), "2-0-0", &EndpointConfig::new("bing.com"))
                .unwrap();
        assert_eq!(staged.len(), 2);

        let rejected = [
            ("1-0-0", EndpointConfig::new("localhost:8082")),
            ("2.0.0", EndpointConfig::new("files.internal").with_scheme("ftp")),
            ("2.0.0", EndpointConfig::new("")),
        ];
        for (version, endpoint) in &rejected {
            assert!(
                matches!(
                    staged_versions("search", stored.clone(), version, endpoint),
                    Err(StoreError::InvalidBinding(_))
                ),
                "{version} should be rejected"
            );
        }
    }

    #[test]
    fn test_decode_endpoints() {
        let raw = HashMap::from([(
            "1.0.0".to_string(),
            r#"{"host":"localhost:8081","headers":{"host":"echo.internal"}}"#.to_string(),
        )]);
        let endpoints = decode_endpoints("echo", raw).unwrap();
        assert_eq!(endpoints["1.0.0"].host, "localhost:8081");
        assert_eq!(endpoints["1.0.0"].headers["host"], "echo.internal");

        let bad = HashMap::from([("1.0.0".to_string(), "not json".to_string())]);
        assert!(matches!(
            decode_endpoints("echo", bad),
            Err(StoreError::Decode { .. })
        ));
    }
}
