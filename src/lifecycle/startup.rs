//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the configured routing store
//! - Publish the initial routing table before accepting traffic
//! - Start the table follower, the proxy listener and the admin listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::{GatewayConfig, SourceConfig};
use crate::http::{serve, ProxyServer, TransportError};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::routing::RoutingSnapshot;
use crate::store::{FileStore, RedisStore, RoutingStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("routing store: {0}")]
    Store(#[from] StoreError),

    #[error("http client: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} stopped unexpectedly")]
    Task(&'static str),
}

/// Build the store named by `source`.
pub async fn open_store(source: &SourceConfig) -> Result<Arc<dyn RoutingStore>, StoreError> {
    match source {
        SourceConfig::File { path } => {
            tracing::info!(path = %path.display(), "Using file routing store");
            Ok(Arc::new(FileStore::new(path.clone())?))
        }
        SourceConfig::Redis { url } => Ok(Arc::new(RedisStore::connect(url).await?)),
    }
}

/// A started gateway.
pub struct Gateway {
    snapshot: Arc<RoutingSnapshot>,
    proxy_addr: SocketAddr,
    admin_addr: Option<SocketAddr>,
    servers: Vec<(&'static str, JoinHandle<Result<(), std::io::Error>>)>,
}

impl Gateway {
    /// Start with the store from `config.source`.
    pub async fn start(config: &GatewayConfig, shutdown: &Shutdown) -> Result<Self, StartupError> {
        let store = open_store(&config.source).await?;
        Self::start_with_store(config, store, shutdown).await
    }

    /// Start with an already constructed store.
    pub async fn start_with_store(
        config: &GatewayConfig,
        store: Arc<dyn RoutingStore>,
        shutdown: &Shutdown,
    ) -> Result<Self, StartupError> {
        if config.observability.metrics_enabled {
            match config.observability.metrics_address.parse() {
                Ok(addr) => metrics::init_metrics(addr),
                Err(_) => tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                ),
            }
        }

        let snapshot = Arc::new(RoutingSnapshot::new());
        let mut updates = store.watch().await?;
        if let Some(initial) = updates.recv().await {
            if snapshot.apply(&initial).is_err() {
                tracing::warn!("Initial routing table rejected, starting with an empty table");
            }
        }
        tokio::spawn(snapshot.clone().follow(updates));

        let mut servers = Vec::new();

        let proxy = ProxyServer::new(config, snapshot.clone())?;
        let listener = bind(&config.listener.bind_address).await?;
        let proxy_addr = local_addr(&listener, &config.listener.bind_address)?;
        servers.push(("proxy", tokio::spawn(proxy.run(listener, shutdown.subscribe()))));

        let admin_addr = if config.admin.enabled {
            let state = AdminState::new(store, snapshot.clone(), &config.admin.api_key);
            if state.api_key.is_empty() {
                tracing::warn!("Admin API enabled without an api_key");
            }
            let listener = bind(&config.admin.bind_address).await?;
            let addr = local_addr(&listener, &config.admin.bind_address)?;
            let router = setup_admin_router(state);
            servers.push(("admin", tokio::spawn(serve("admin", listener, router, shutdown.subscribe()))));
            Some(addr)
        } else {
            None
        };

        tracing::info!(
            proxy = %proxy_addr,
            admin = ?admin_addr,
            generation = snapshot.generation(),
            "Gateway started"
        );

        Ok(Self {
            snapshot,
            proxy_addr,
            admin_addr,
            servers,
        })
    }

    pub fn proxy_addr(&self) -> SocketAddr {
        self.proxy_addr
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn snapshot(&self) -> &Arc<RoutingSnapshot> {
        &self.snapshot
    }

    /// Wait for every listener to finish draining.
    pub async fn wait(self) -> Result<(), StartupError> {
        for (name, handle) in self.servers {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(server = name, error = %e, "Server failed");
                    return Err(StartupError::Task(name));
                }
                Err(e) => {
                    tracing::error!(server = name, error = %e, "Server task panicked");
                    return Err(StartupError::Task(name));
                }
            }
        }
        Ok(())
    }
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

fn local_addr(listener: &TcpListener, address: &str) -> Result<SocketAddr, StartupError> {
    listener.local_addr().map_err(|source| StartupError::Bind {
        address: address.to_string(),
        source,
    })
}
