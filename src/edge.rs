use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    AppState,
    models::Session,
    paths::{DASHBOARD_PATH, LOGIN_PATH, PathTable, RouteAccess},
    session::{CookieBridge, SessionProvider, SessionSnapshot},
};

/// Query keys that mark an in-flight sign-out.
pub const SIGN_OUT_MARKERS: &[&str] = &["signOut", "clear"];

/// EdgeDecision
///
/// Outcome of the gatekeeper for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeDecision {
    Pass,
    RedirectToLogin { redirect_to: String },
    RedirectToDashboard,
}

impl EdgeDecision {
    /// Redirect location, if the decision is a redirect.
    pub fn location(&self) -> Option<String> {
        match self {
            EdgeDecision::Pass => None,
            EdgeDecision::RedirectToLogin { redirect_to } => Some(login_location(redirect_to)),
            EdgeDecision::RedirectToDashboard => Some(DASHBOARD_PATH.to_string()),
        }
    }
}

/// `/login?redirectTo=<path>` with the path form-encoded (`/dashboard` → `%2Fdashboard`).
pub fn login_location(redirect_to: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(redirect_to.as_bytes()).collect();
    format!("{LOGIN_PATH}?redirectTo={encoded}")
}

/// True when the query carries a sign-out marker key, whatever its value.
pub fn sign_out_requested(query: Option<&str>) -> bool {
    let Some(query) = query else {
        return false;
    };
    url::form_urlencoded::parse(query.as_bytes())
        .any(|(key, _)| SIGN_OUT_MARKERS.iter().any(|marker| key == *marker))
}

/// decide
///
/// Protected without a session goes to login, auth-only with a session goes to the
/// dashboard, everything else passes.
pub fn decide(table: &PathTable, path: &str, has_session: bool) -> EdgeDecision {
    match (table.classify(path), has_session) {
        (RouteAccess::Protected, false) => EdgeDecision::RedirectToLogin {
            redirect_to: path.to_string(),
        },
        (RouteAccess::AuthOnly, true) => EdgeDecision::RedirectToDashboard,
        _ => EdgeDecision::Pass,
    }
}

/// lookup_session
///
/// Asks the provider for the current session within `timeout`. A timeout or provider error
/// is logged and reads as "no session"; the request carries on either way.
pub async fn lookup_session(
    provider: &dyn SessionProvider,
    cookies: &mut CookieBridge,
    timeout: Duration,
) -> Option<Session> {
    match tokio::time::timeout(timeout, provider.get_session(cookies)).await {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => {
            tracing::warn!("session lookup failed, treating as signed out: {e}");
            None
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "session lookup timed out, treating as signed out"
            );
            None
        }
    }
}

/// edge_gatekeeper
///
/// Router-wide middleware run before any page handler.
///
/// 1. Asset and image paths from the matcher configuration pass untouched.
/// 2. A sign-out marker in the query skips the lookup so a stale cookie cannot count as a
///    live session mid sign-out.
/// 3. The session is looked up under the configured bound.
/// 4. The decision is applied. Cookie writes from the lookup land on the response on every
///    branch; on pass-through they are also folded into the forwarded request together
///    with the observed `SessionSnapshot`.
pub async fn edge_gatekeeper(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if state.paths.is_edge_excluded(&path) {
        return next.run(request).await;
    }

    let mut cookies = CookieBridge::from_headers(request.headers(), state.config.secure_cookies());

    let session = if sign_out_requested(request.uri().query()) {
        tracing::debug!(%path, "sign-out marker present, skipping session lookup");
        None
    } else {
        lookup_session(
            state.sessions.as_ref(),
            &mut cookies,
            state.config.session_lookup_timeout,
        )
        .await
    };

    let decision = decide(&state.paths, &path, session.is_some());

    let mut response = match decision.location() {
        Some(location) => {
            tracing::info!(%path, %location, "edge redirect");
            Redirect::temporary(&location).into_response()
        }
        None => {
            cookies.apply_to_request(request.headers_mut());
            request.extensions_mut().insert(SessionSnapshot(session));
            next.run(request).await
        }
    };

    cookies.apply_to_response(response.headers_mut());
    response
}
