//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use byway::config::{GatewayConfig, SourceConfig, UnroutedPolicy};
use byway::lifecycle::{Gateway, Shutdown};
use byway::routing::RawRoutingTable;
use byway::store::{FileStore, RoutingStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a backend that answers every request with its own request head.
///
/// The body is the request line and headers exactly as received, followed
/// by a `backend: <name>` line so tests can tell backends apart.
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut head = Vec::new();
                        let mut buf = [0u8; 1024];
                        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => head.extend_from_slice(&buf[..n]),
                            }
                        }
                        let body = format!("{}backend: {}\n", String::from_utf8_lossy(&head), name);
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Gateway config on ephemeral ports, reading its table from `table_path`.
pub fn test_config(table_path: &Path, unrouted: UnroutedPolicy) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.routing.unrouted = unrouted;
    config.source = SourceConfig::File {
        path: table_path.to_path_buf(),
    };
    config.admin.enabled = true;
    config.admin.bind_address = "127.0.0.1:0".to_string();
    config
}

/// Write `table` as YAML and start a gateway on it.
pub async fn start_gateway(
    dir: &Path,
    table: &RawRoutingTable,
    unrouted: UnroutedPolicy,
) -> (Gateway, Shutdown) {
    let path = dir.join("conf.yml");
    std::fs::write(&path, serde_yaml::to_string(table).unwrap()).unwrap();

    let config = test_config(&path, unrouted);
    let store: Arc<dyn RoutingStore> = Arc::new(FileStore::new(&path).unwrap());
    let shutdown = Shutdown::new();
    let gateway = Gateway::start_with_store(&config, store, &shutdown)
        .await
        .unwrap();
    (gateway, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
