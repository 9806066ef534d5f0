use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access policy.
pub mod admin;
pub mod auth;
pub mod edge;
pub mod paths;
pub mod verification;

// Collaborators and configuration.
pub mod config;
pub mod models;
pub mod profile;
pub mod session;
pub mod supabase;

// HTTP surface.
pub mod export;
pub mod handlers;
pub mod pages;
pub mod routes;
use routes::{admin as admin_pages, api, auth as auth_routes, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use paths::{PathTable, PathTableState};
pub use profile::{MockProfileStore, PostgresProfileStore, ProfileState};
pub use session::{MockSessionProvider, SessionState};

/// ApiDoc
///
/// OpenAPI document for the JSON endpoints, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::get_auth_snapshot, handlers::get_gate_decision),
    components(
        schemas(
            models::AuthSnapshot, models::UserIdentity, models::Profile,
            models::VerificationStatus, models::GateDecision, models::GateOutcomeKind,
        )
    ),
    tags(
        (name = "peerly-gate", description = "Peerly route-access policy API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, immutable container of the collaborators every gate layer needs. Built once in
/// `main` and cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Identity provider.
    pub sessions: SessionState,
    /// Profile store for verification status.
    pub profiles: ProfileState,
    /// The loaded configuration.
    pub config: AppConfig,
    /// Path classification shared by the edge and the verification gate.
    pub paths: PathTableState,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for ProfileState {
    fn from_ref(app_state: &AppState) -> ProfileState {
        app_state.profiles.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for PathTableState {
    fn from_ref(app_state: &AppState) -> PathTableState {
        app_state.paths.clone()
    }
}

/// create_router
///
/// Assembles the routes and their gate layers.
///
/// - Page routers share the verification gate as a route layer.
/// - Auth plumbing, the API and Swagger UI skip it.
/// - The edge gatekeeper wraps everything, unmatched paths included.
/// - Request id, tracing and CORS sit outermost.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let pages = Router::new()
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        .merge(admin_pages::admin_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            verification::verification_middleware,
        ));

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(pages)
        .merge(auth_routes::auth_routes())
        .merge(api::api_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            edge::edge_gatekeeper,
        ))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span per request carrying method, URI and the `x-request-id` set above.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
