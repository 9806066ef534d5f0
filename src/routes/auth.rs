use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Auth Router Module
///
/// Session plumbing. Kept outside the verification gate: a pending user must always be
/// able to finish signing in and to sign out.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        // GET /auth/callback?code=...&next=...
        // Trades the provider's callback code for a session and sets the session cookie.
        .route("/auth/callback", get(handlers::auth_callback))
        // POST /auth/signout
        // Clears the session and redirects to `/?signOut=true`.
        .route("/auth/signout", post(handlers::sign_out))
}
