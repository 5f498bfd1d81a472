use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
};
use std::sync::Arc;

use crate::presentation::rest::{ApiError, dto::*};

use super::AppState;

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: state.clock.now().to_rfc3339(),
        state: state.query.state(),
    })
}

/// GET /signals
pub async fn signals(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<SignalsResponse>, ApiError> {
    let limit = resolve_limit(query, state.limits.recent_limit)?;
    Ok(Json(SignalsResponse::new(state.query.recent(limit))))
}

/// GET /signals/{pair}
pub async fn signals_for_pair(
    State(state): State<Arc<AppState>>,
    Path(pair): Path<String>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<PairSignalsResponse>, ApiError> {
    let limit = resolve_limit(query, state.limits.pair_limit)?;
    let signals = state.query.recent_for_symbol(&pair, limit);
    Ok(Json(PairSignalsResponse::new(pair, signals)))
}

/// POST /trigger
pub async fn trigger(State(state): State<Arc<AppState>>) -> Result<Json<TriggerResponse>, ApiError> {
    // The tick runs on its own task and completes without the handle.
    let _ = state.query.trigger()?;
    tracing::info!("Manual decision pass triggered");

    Ok(Json(TriggerResponse {
        message: "decision triggered".to_string(),
    }))
}

fn resolve_limit(
    query: Result<Query<LimitQuery>, QueryRejection>,
    default: usize,
) -> Result<usize, ApiError> {
    let Query(query) =
        query.map_err(|e| ApiError::invalid_parameter("limit", &e.body_text()))?;

    match query.limit {
        None => Ok(default),
        Some(0) => Err(ApiError::invalid_parameter("limit", "must be positive")),
        Some(n) => Ok(n),
    }
}
