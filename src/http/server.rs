//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the catch-all proxy handler
//! - Wire up middleware (timeout, request ID, tracing)
//! - Direct each request and forward it upstream
//! - Record per-request metrics

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::director::Director;
use crate::http::transport::{Transport, TransportError};
use crate::observability::metrics;
use crate::routing::RoutingSnapshot;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub director: Arc<Director>,
    pub transport: Transport,
}

/// The gateway's proxy listener.
pub struct ProxyServer {
    router: Router,
}

impl ProxyServer {
    pub fn new(config: &GatewayConfig, snapshot: Arc<RoutingSnapshot>) -> Result<Self, TransportError> {
        let state = AppState {
            director: Arc::new(Director::new(snapshot, config.routing.unrouted)),
            transport: Transport::new(&config.timeouts)?,
        };
        let router = Self::build_router(config, state);
        Ok(Self { router })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until a shutdown signal arrives.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        serve("proxy", listener, self.router, shutdown).await
    }
}

/// Serve `router` on `listener` with graceful shutdown.
pub async fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(server = name, address = %addr, "HTTP server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!(server = name, "HTTP server stopped");
    Ok(())
}

/// Main proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().to_string();

    let (mut parts, body) = request.into_parts();
    let directed = match state.director.direct(&mut parts) {
        Ok(directed) => directed,
        Err(e) => {
            let status = e.status();
            tracing::warn!(request_id = %request_id, status = status.as_u16(), error = %e, "Request not directed");
            metrics::record_request(&method, status.as_u16(), "error", start);
            return (status, e.to_string()).into_response();
        }
    };

    let upstream = parts.uri.to_string();
    match state.transport.forward(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let status = response.status();
            tracing::debug!(
                request_id = %request_id,
                upstream = %upstream,
                status = status.as_u16(),
                outcome = directed.outcome(),
                "Request forwarded"
            );
            metrics::record_request(&method, status.as_u16(), directed.outcome(), start);
            response
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, upstream = %upstream, error = %e, "Upstream error");
            metrics::record_request(&method, StatusCode::BAD_GATEWAY.as_u16(), "error", start);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
