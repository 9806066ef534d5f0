use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// API Router Module
///
/// JSON endpoints a browser client polls to run the verification gate on its own
/// navigations, plus the health probe.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/session", get(handlers::get_auth_snapshot))
        .route("/api/gate", get(handlers::get_gate_decision))
}
