use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use crate::{
    AppState,
    admin::admin_guard,
    auth::{AuthContext, is_super_admin},
    models::{AuthSnapshot, GateDecision},
    pages::{self, escape},
    paths::{DASHBOARD_PATH, HOME_PATH, LOGIN_PATH},
    session::CookieBridge,
    verification::{GateInput, evaluate},
};

// --- Query Structs ---

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoginQuery {
    pub redirect_to: Option<String>,
    pub error: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub next: Option<String>,
}

/// GateQuery
///
/// Path the browser is about to show.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct GateQuery {
    pub path: String,
}

/// Only same-origin absolute paths are accepted as post-login destinations.
/// Browsers treat `\` as `/`, so `/\host` is protocol-relative too.
pub fn safe_local_path(candidate: Option<&str>) -> Option<&str> {
    candidate.filter(|path| {
        path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
    })
}

// --- Public Pages ---

pub async fn home() -> Html<String> {
    pages::render("Home", "<h1>Buy and sell with students on your campus</h1>")
}

pub async fn browse() -> Html<String> {
    pages::render("Browse", "<h1>Browse listings</h1>")
}

pub async fn terms() -> Html<String> {
    pages::render("Terms of Service", "<h1>Terms of Service</h1>")
}

pub async fn privacy() -> Html<String> {
    pages::render("Privacy Policy", "<h1>Privacy Policy</h1>")
}

/// login_page
///
/// Carries `redirectTo` through to the sign-in form so the user lands back where the edge
/// stopped them.
pub async fn login_page(Query(query): Query<LoginQuery>) -> Html<String> {
    let redirect_to = safe_local_path(query.redirect_to.as_deref()).unwrap_or(DASHBOARD_PATH);
    let error = query
        .error
        .map(|e| format!("<p role=\"alert\">{}</p>", escape(&e)))
        .unwrap_or_default();
    pages::render(
        "Log in",
        &format!(
            "<h1>Log in</h1>{error}\
             <form method=\"post\"><input type=\"hidden\" name=\"redirectTo\" value=\"{}\"></form>",
            escape(redirect_to)
        ),
    )
}

pub async fn signup_page() -> Html<String> {
    pages::render("Sign up", "<h1>Create your account</h1>")
}

pub async fn verify_page(ctx: AuthContext) -> Html<String> {
    let status = ctx
        .profile
        .as_ref()
        .map(|profile| profile.verification_status.as_str())
        .unwrap_or("unknown");
    pages::render(
        "Verify",
        &format!("<h1>Verify your student status</h1><p>Current status: {status}</p>"),
    )
}

// --- Protected Pages ---

pub async fn dashboard() -> Html<String> {
    pages::render("Dashboard", "<h1>Your dashboard</h1>")
}

pub async fn create_listing() -> Html<String> {
    pages::render("Create listing", "<h1>Create a listing</h1>")
}

pub async fn messages() -> Html<String> {
    pages::render("Messages", "<h1>Messages</h1>")
}

pub async fn settings() -> Html<String> {
    pages::render("Settings", "<h1>Settings</h1>")
}

// --- Admin Page ---

/// admin_page
///
/// Renders the admin subtree through the admin guard; denied users see who they are
/// signed in as and a link home.
pub async fn admin_page(State(state): State<AppState>, ctx: AuthContext) -> Html<String> {
    let view = admin_guard(&ctx, &state.config.super_admin_email);
    pages::admin(&view)
}

// --- Auth Plumbing ---

/// auth_callback
///
/// Completes an OAuth / magic-link sign-in. The provider writes the session cookies
/// through the bridge; they are copied onto the redirect.
pub async fn auth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let mut cookies = CookieBridge::from_headers(&headers, state.config.secure_cookies());

    let location = match query.code.as_deref() {
        Some(code) => match state.sessions.exchange_code(code, &mut cookies).await {
            Ok(session) => {
                tracing::info!(user_id = %session.user.id, "sign-in completed");
                safe_local_path(query.next.as_deref())
                    .unwrap_or(DASHBOARD_PATH)
                    .to_string()
            }
            Err(e) => {
                tracing::warn!("code exchange failed: {e}");
                format!("{LOGIN_PATH}?error=auth_callback_failed")
            }
        },
        None => format!("{LOGIN_PATH}?error=auth_callback_failed"),
    };

    let mut response = Redirect::temporary(&location).into_response();
    cookies.apply_to_response(response.headers_mut());
    response
}

/// sign_out
///
/// Ends the session and lands on the home page carrying the sign-out marker, so the edge
/// does not read a cookie the browser has not dropped yet.
pub async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut cookies = CookieBridge::from_headers(&headers, state.config.secure_cookies());

    if let Err(e) = state.sessions.sign_out(&mut cookies).await {
        tracing::warn!("provider sign-out failed, local cookies cleared anyway: {e}");
    }

    let mut response = Redirect::to(&format!("{HOME_PATH}?signOut=true")).into_response();
    cookies.apply_to_response(response.headers_mut());
    response
}

// --- API ---

/// get_auth_snapshot
///
/// Identity and profile of the caller, for browser-side gating.
#[utoipa::path(
    get,
    path = "/api/session",
    responses((status = 200, description = "Current auth state", body = AuthSnapshot))
)]
pub async fn get_auth_snapshot(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Json<AuthSnapshot> {
    let is_super_admin = ctx
        .user
        .as_ref()
        .is_some_and(|user| is_super_admin(user, &state.config.super_admin_email));
    Json(AuthSnapshot {
        user: ctx.user,
        profile: ctx.profile,
        is_super_admin,
    })
}

/// get_gate_decision
///
/// Evaluates the verification gate for the caller on `path`.
#[utoipa::path(
    get,
    path = "/api/gate",
    params(GateQuery),
    responses((status = 200, description = "Verification gate decision", body = GateDecision))
)]
pub async fn get_gate_decision(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<GateQuery>,
) -> Json<GateDecision> {
    let input = GateInput::from_context(&ctx, &query.path);
    let outcome = evaluate(&input, &state.paths, &state.config.super_admin_email);
    Json(outcome.to_decision(&query.path))
}
