//! Management API.
//!
//! Thin HTTP surface over a [`RoutingStore`]. Every mutation goes to the
//! store, and the gateway picks the change up through the store's watch
//! like any other update; nothing here touches the active snapshot.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::routing::RoutingSnapshot;
use crate::store::RoutingStore;

#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn RoutingStore>,
    pub snapshot: Arc<RoutingSnapshot>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(store: Arc<dyn RoutingStore>, snapshot: Arc<RoutingSnapshot>, api_key: &str) -> Self {
        Self {
            store,
            snapshot,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/table", get(get_table))
        .route("/rewrites", post(create_rewrite))
        .route("/rewrites/{index}", delete(remove_rewrite))
        .route("/services", post(create_service))
        .route("/services/{service}/versions/{version}", put(create_binding))
        .route(
            "/topologies/{topology}/services/{service}",
            put(add_service_to_topology),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
