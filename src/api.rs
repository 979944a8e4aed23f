//! Operational HTTP surface: liveness, source catalog with breaker state, and
//! manual breaker reset / enable toggles.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::ingest::circuit_breaker::CircuitState;
use crate::ingest::registry::SourceRegistry;
use crate::ingest::types::SourceConfig;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SourceRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/sources", get(list_sources))
        .route("/sources/{id}/reset", post(reset_source))
        .route("/sources/{id}/enabled", post(set_enabled))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SourceStatus {
    pub config: SourceConfig,
    pub breaker: CircuitState,
}

async fn list_sources(State(state): State<AppState>) -> Json<Vec<SourceStatus>> {
    let breaker = state.registry.breaker();
    let out = state
        .registry
        .all_sources()
        .iter()
        .map(|s| SourceStatus {
            config: s.config(),
            breaker: breaker.state(s.id()),
        })
        .collect();
    Json(out)
}

async fn reset_source(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.registry.get_source(&id).is_none() {
        return StatusCode::NOT_FOUND;
    }
    state.registry.breaker().reset(&id);
    info!(target: "ingest", source_id = %id, "breaker reset via ops api");
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct EnabledReq {
    enabled: bool,
}

async fn set_enabled(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EnabledReq>,
) -> StatusCode {
    if state.registry.set_enabled(&id, body.enabled) {
        info!(target: "ingest", source_id = %id, enabled = body.enabled, "source toggled via ops api");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
