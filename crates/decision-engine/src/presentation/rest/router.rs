use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use signal_ports::Clock;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::application::SignalQueryService;
use crate::infrastructure::QueryConfig;

/// Application state shared across handlers
pub struct AppState {
    pub query: Arc<SignalQueryService>,
    pub clock: Arc<dyn Clock>,
    pub limits: QueryConfig,
}

impl AppState {
    pub fn new(query: Arc<SignalQueryService>, clock: Arc<dyn Clock>, limits: QueryConfig) -> Self {
        AppState {
            query,
            clock,
            limits,
        }
    }
}

/// Create the REST API router
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/signals", get(handlers::signals))
        .route("/signals/{pair}", get(handlers::signals_for_pair))
        .route("/trigger", post(handlers::trigger))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .with_state(state)
}
