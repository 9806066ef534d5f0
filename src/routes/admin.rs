use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// The admin subtree. Not protected at the edge and exempt from verification; the admin
/// guard inside the handler decides between the admin view and the access-denied view.
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin", get(handlers::admin_page))
}
