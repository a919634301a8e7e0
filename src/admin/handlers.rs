use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::routing::table::{EndpointConfig, RawRoutingTable, TableEditError};
use crate::store::StoreError;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub generation: u64,
    pub services: usize,
    pub rewrites: usize,
    pub topologies: usize,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RuleBody {
    pub rule: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServiceBody {
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PinBody {
    pub version: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl StoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::Edit(TableEditError::RewriteIndexOutOfRange { .. }) => StatusCode::NOT_FOUND,
            StoreError::Edit(TableEditError::RewriteMismatch { .. }) => StatusCode::CONFLICT,
            StoreError::InvalidRewrite(_)
            | StoreError::InvalidBinding(_)
            | StoreError::InvalidVersion { .. }
            | StoreError::InvalidName(_) => StatusCode::BAD_REQUEST,
            StoreError::Redis(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Routing store operation failed");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// Active table summary.
pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let table = state.snapshot.load();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        generation: state.snapshot.generation(),
        services: table.service_count(),
        rewrites: table.rewrites().len(),
        topologies: table.topologies().len(),
    })
}

/// Stored table, as the source currently holds it.
pub async fn get_table(State(state): State<AdminState>) -> Result<Json<RawRoutingTable>, StoreError> {
    Ok(Json(state.store.load().await?))
}

pub async fn create_rewrite(
    State(state): State<AdminState>,
    Json(body): Json<RuleBody>,
) -> Result<StatusCode, StoreError> {
    state.store.create_rewrite(&body.rule).await?;
    tracing::info!(rule = %body.rule, "Rewrite created");
    Ok(StatusCode::CREATED)
}

pub async fn remove_rewrite(
    State(state): State<AdminState>,
    Path(index): Path<usize>,
    Json(body): Json<RuleBody>,
) -> Result<StatusCode, StoreError> {
    state.store.remove_rewrite(index, &body.rule).await?;
    tracing::info!(index, rule = %body.rule, "Rewrite removed");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_service(
    State(state): State<AdminState>,
    Json(body): Json<ServiceBody>,
) -> Result<StatusCode, StoreError> {
    state.store.create_service(&body.name).await?;
    tracing::info!(service = %body.name, "Service created");
    Ok(StatusCode::CREATED)
}

pub async fn create_binding(
    State(state): State<AdminState>,
    Path((service, version)): Path<(String, String)>,
    Json(endpoint): Json<EndpointConfig>,
) -> Result<StatusCode, StoreError> {
    state.store.create_binding(&service, &version, &endpoint).await?;
    tracing::info!(service = %service, version = %version, host = %endpoint.host, "Binding set");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_service_to_topology(
    State(state): State<AdminState>,
    Path((topology, service)): Path<(String, String)>,
    Json(body): Json<PinBody>,
) -> Result<StatusCode, StoreError> {
    state
        .store
        .add_service_to_topology(&topology, &service, &body.version)
        .await?;
    tracing::info!(topology = %topology, service = %service, version = %body.version, "Topology pin set");
    Ok(StatusCode::NO_CONTENT)
}
