//! HTTP API for the pairing broker.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::{log_request, throttle_pairing, PairingRateLimit};
pub use types::*;

use crate::lifecycle::SessionController;
use axum::{middleware as axum_middleware, routing::get, Router};
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle controller
    pub controller: SessionController,
    /// When the process started serving
    pub started_at: Instant,
}

impl AppState {
    /// Create new application state.
    pub fn new(controller: SessionController) -> Self {
        Self {
            controller,
            started_at: Instant::now(),
        }
    }
}

/// Create the API router with default rate limiting.
pub fn create_router(state: AppState) -> Router {
    create_router_with_rate_limit(state, PairingRateLimit::per_minute(30))
}

/// Create the API router with custom rate limiting.
pub fn create_router_with_rate_limit(state: AppState, rate_limit: PairingRateLimit) -> Router {
    let pairing = Router::new()
        .route("/code", get(handlers::request_code))
        .layer(axum_middleware::from_fn_with_state(
            rate_limit,
            throttle_pairing,
        ));

    Router::new()
        // Health check (no rate limiting)
        .route("/health", get(handlers::health))
        .merge(pairing)
        .layer(axum_middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
