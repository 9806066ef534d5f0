use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Pages reachable without a session. Which of them an unverified user may see is decided
/// by the verification gate, not by this router.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // Landing page. Exempt from verification (root only, not everything under it).
        .route("/", get(handlers::home))
        // GET /browse
        // Listing browser, open to unverified users.
        .route("/browse", get(handlers::browse))
        // GET /terms, /privacy
        // Static legal pages. Not exempt: an unverified, signed-in user is sent to /verify.
        .route("/terms", get(handlers::terms))
        .route("/privacy", get(handlers::privacy))
        // GET /login?redirectTo=..., /signup
        // Auth-only: the edge sends signed-in users to /dashboard.
        .route("/login", get(handlers::login_page))
        .route("/signup", get(handlers::signup_page))
        // GET /verify
        // Where unverified users are sent; must stay exempt.
        .route("/verify", get(handlers::verify_page))
}
