use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Diagnostics
        .route("/devices", get(handlers::list_devices))
        // Session control
        .route("/session", get(handlers::get_session_status))
        .route("/session/start", post(handlers::start_recording))
        .route("/session/mark", post(handlers::add_marker))
        .route("/session/stop", post(handlers::stop_recording))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
