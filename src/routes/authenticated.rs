use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Pages the edge gatekeeper only lets through with a session. Anonymous requests never
/// reach these handlers: they are redirected to `/login?redirectTo=<path>` first.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/dashboard", get(handlers::dashboard))
        .route("/create", get(handlers::create_listing))
        .route("/messages", get(handlers::messages))
        // Protected at the edge but exempt from verification, so unverified users can
        // still manage their account.
        .route("/settings", get(handlers::settings))
}
