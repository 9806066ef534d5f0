use std::time::SystemTime;

use axum::{
    Json, Router,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    routing::post,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use peerly_gate::{
    config::{AppConfig, ClientContext, ConfigError, SupabaseSettings},
    session::{CookieBridge, DisabledSessionProvider, SessionError, SessionProvider},
    supabase::{
        AccessTokenClaims, MAX_COOKIE_CHUNK_SIZE, StoredSession, SupabaseSessionProvider,
        TOKEN_AUDIENCE, decode_session_cookie, edge_session_provider, encode_session_cookie,
        session_client, session_cookie_name,
    },
};
use serde_json::json;
use tokio::net::TcpListener;
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_USER_ID: Uuid = Uuid::from_u128(1);
// Nothing listens on the discard port; any network call fails fast.
const UNREACHABLE_URL: &str = "http://127.0.0.1:9";
const COOKIE: &str = "sb-127-auth-token";

fn settings() -> SupabaseSettings {
    settings_for(UNREACHABLE_URL)
}

fn settings_for(url: &str) -> SupabaseSettings {
    SupabaseSettings {
        url: url.to_string(),
        anon_key: "anon".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
    }
}

/// Serves `POST /auth/v1/token` with a fixed answer on an ephemeral local port.
async fn spawn_token_endpoint(status: StatusCode, body: serde_json::Value) -> String {
    let app = Router::new().route(
        "/auth/v1/token",
        post(move || {
            let body = body.clone();
            async move { (status, Json(body)) }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn token_response(access_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "refresh_token": "rotated-refresh-token",
        "expires_in": 3600,
        "expires_at": 4_102_444_800_i64,
        "user": { "id": TEST_USER_ID, "email": "student@college.edu" }
    })
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn create_token(secret: &str, exp: u64) -> String {
    let claims = AccessTokenClaims {
        sub: TEST_USER_ID,
        email: Some("student@college.edu".to_string()),
        aud: TOKEN_AUDIENCE.to_string(),
        exp: exp as usize,
        iat: now() as usize,
        role: Some("authenticated".to_string()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn cookie_for(access_token: String) -> String {
    encode_session_cookie(&StoredSession {
        access_token,
        refresh_token: "refresh-token".to_string(),
        expires_at: now() as i64 + 3600,
    })
    .unwrap()
}

fn bridge(cookies: &[(&str, &str)]) -> CookieBridge {
    let mut headers = HeaderMap::new();
    let joined = cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ");
    if !joined.is_empty() {
        headers.insert(header::COOKIE, HeaderValue::from_str(&joined).unwrap());
    }
    CookieBridge::from_headers(&headers, false)
}

// --- Cookie Format ---

#[test]
fn test_cookie_name_uses_project_ref() {
    assert_eq!(
        session_cookie_name("https://abcdefgh.supabase.co").unwrap(),
        "sb-abcdefgh-auth-token"
    );
    assert_eq!(session_cookie_name(UNREACHABLE_URL).unwrap(), COOKIE);
    assert_eq!(
        SupabaseSessionProvider::new(settings()).unwrap().cookie_name(),
        COOKIE
    );
    assert!(matches!(
        session_cookie_name("not a url"),
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
fn test_plain_json_cookie_is_accepted() {
    let raw = r#"{"access_token":"a","refresh_token":"r","expires_at":10}"#;
    assert_eq!(
        decode_session_cookie(raw),
        Some(StoredSession {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: 10,
        })
    );
    assert_eq!(decode_session_cookie("base64-%%%"), None);
}

// --- get_session ---

#[tokio::test]
async fn test_no_cookie_means_no_session() {
    let provider = SupabaseSessionProvider::new(settings()).unwrap();
    let mut cookies = bridge(&[]);

    let session = provider.get_session(&mut cookies).await.unwrap();

    assert!(session.is_none());
    assert!(cookies.mutations().is_empty());
}

#[tokio::test]
async fn test_valid_token_is_verified_locally() {
    let provider = SupabaseSessionProvider::new(settings()).unwrap();
    let value = cookie_for(create_token(TEST_JWT_SECRET, now() + 3600));
    let mut cookies = bridge(&[(COOKIE, &value)]);

    let session = provider.get_session(&mut cookies).await.unwrap().unwrap();

    assert_eq!(session.user.id, TEST_USER_ID);
    assert_eq!(session.user.email, "student@college.edu");
    assert_eq!(session.refresh_token, "refresh-token");
    assert!(cookies.mutations().is_empty());
}

#[tokio::test]
async fn test_chunked_cookie_is_reassembled() {
    let provider = SupabaseSessionProvider::new(settings()).unwrap();
    let value = cookie_for(create_token(TEST_JWT_SECRET, now() + 3600));
    let (first, second) = value.split_at(value.len() / 2);
    let first_name = format!("{COOKIE}.0");
    let second_name = format!("{COOKIE}.1");
    let mut cookies = bridge(&[(&first_name, first), (&second_name, second)]);

    let session = provider.get_session(&mut cookies).await.unwrap();

    assert_eq!(session.map(|s| s.user.id), Some(TEST_USER_ID));
}

#[tokio::test]
async fn test_malformed_cookie_is_cleared() {
    let provider = SupabaseSessionProvider::new(settings()).unwrap();
    let mut cookies = bridge(&[(COOKIE, "base64-bm90LWpzb24")]);

    let session = provider.get_session(&mut cookies).await.unwrap();

    assert!(session.is_none());
    assert!(
        cookies
            .mutations()
            .iter()
            .any(|m| m.name == COOKIE && m.is_removal())
    );
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_an_error() {
    let provider = SupabaseSessionProvider::new(settings()).unwrap();
    let value = cookie_for(create_token("some-other-secret", now() + 3600));
    let mut cookies = bridge(&[(COOKIE, &value)]);

    let result = provider.get_session(&mut cookies).await;

    assert!(matches!(result, Err(SessionError::InvalidToken(_))));
}

#[tokio::test]
async fn test_expired_token_with_unreachable_provider_is_a_transport_error() {
    let provider = SupabaseSessionProvider::new(settings()).unwrap();
    let value = cookie_for(create_token(TEST_JWT_SECRET, now() - 3600));
    let mut cookies = bridge(&[(COOKIE, &value)]);

    let result = provider.get_session(&mut cookies).await;

    assert!(matches!(result, Err(SessionError::Transport(_))));
    // The cookie is left alone: the provider may be back on the next request.
    assert!(cookies.mutations().is_empty());
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_cookie_rotated() {
    let url = spawn_token_endpoint(StatusCode::OK, token_response("rotated-access-token")).await;
    let provider = SupabaseSessionProvider::new(settings_for(&url)).unwrap();
    let value = cookie_for(create_token(TEST_JWT_SECRET, now() - 3600));
    let mut cookies = bridge(&[(COOKIE, &value)]);

    let session = provider.get_session(&mut cookies).await.unwrap().unwrap();

    assert_eq!(session.user.id, TEST_USER_ID);
    assert_eq!(session.access_token, "rotated-access-token");

    let written = cookies
        .mutations()
        .iter()
        .find(|m| m.name == COOKIE && !m.is_removal())
        .expect("rotated session cookie");
    assert_eq!(
        decode_session_cookie(&written.value),
        Some(StoredSession {
            access_token: "rotated-access-token".to_string(),
            refresh_token: "rotated-refresh-token".to_string(),
            expires_at: 4_102_444_800,
        })
    );
    assert_eq!(cookies.get(COOKIE), Some(written.value.as_str()));
}

#[tokio::test]
async fn test_rejected_refresh_clears_every_chunk() {
    let url = spawn_token_endpoint(
        StatusCode::BAD_REQUEST,
        json!({ "error": "invalid_grant", "error_description": "Refresh Token Not Found" }),
    )
    .await;
    let provider = SupabaseSessionProvider::new(settings_for(&url)).unwrap();
    let value = cookie_for(create_token(TEST_JWT_SECRET, now() - 3600));
    let (first, second) = value.split_at(value.len() / 2);
    let first_name = format!("{COOKIE}.0");
    let second_name = format!("{COOKIE}.1");
    let mut cookies = bridge(&[(&first_name, first), (&second_name, second)]);

    let session = provider.get_session(&mut cookies).await.unwrap();

    assert!(session.is_none());
    for name in [first_name.as_str(), second_name.as_str(), COOKIE] {
        assert!(
            cookies
                .mutations()
                .iter()
                .any(|m| m.name == name && m.is_removal()),
            "{name} should be removed"
        );
    }
    assert!(cookies.mutations().iter().all(|m| m.is_removal()));
}

#[tokio::test]
async fn test_oversized_session_is_written_in_chunks() {
    let large_token = "x".repeat(6000);
    let url = spawn_token_endpoint(StatusCode::OK, token_response(&large_token)).await;
    let provider = SupabaseSessionProvider::new(settings_for(&url)).unwrap();
    let value = cookie_for(create_token(TEST_JWT_SECRET, now() - 3600));
    let mut cookies = bridge(&[(COOKIE, &value)]);

    provider.get_session(&mut cookies).await.unwrap();

    assert!(
        cookies
            .mutations()
            .iter()
            .any(|m| m.name == COOKIE && m.is_removal())
    );

    let mut joined = String::new();
    let mut index = 0;
    while let Some(chunk) = cookies
        .mutations()
        .iter()
        .find(|m| m.name == format!("{COOKIE}.{index}") && !m.is_removal())
    {
        assert!(chunk.value.len() <= MAX_COOKIE_CHUNK_SIZE);
        joined.push_str(&chunk.value);
        index += 1;
    }
    assert!(index > 1);
    assert_eq!(
        decode_session_cookie(&joined).map(|stored| stored.access_token),
        Some(large_token)
    );
}

// --- exchange_code / sign_out ---

#[tokio::test]
async fn test_exchange_without_verifier_fails() {
    let provider = SupabaseSessionProvider::new(settings()).unwrap();
    let mut cookies = bridge(&[]);

    let result = provider.exchange_code("code-123", &mut cookies).await;

    assert_eq!(result.err(), Some(SessionError::MissingVerifier));
}

#[tokio::test]
async fn test_sign_out_without_session_clears_locally() {
    let provider = SupabaseSessionProvider::new(settings()).unwrap();
    let mut cookies = bridge(&[(COOKIE, "garbage")]);

    provider.sign_out(&mut cookies).await.unwrap();

    assert!(cookies.get(COOKIE).is_none());
    assert!(cookies.mutations().iter().all(|m| m.is_removal()));
}

// --- Client Construction ---

#[test]
fn test_edge_provider_requires_settings() {
    let config = AppConfig {
        supabase: None,
        ..AppConfig::default()
    };

    assert_eq!(
        edge_session_provider(&config).err(),
        Some(ConfigError::Missing("SUPABASE_URL and SUPABASE_ANON_KEY"))
    );
    assert!(edge_session_provider(&AppConfig::default()).is_ok());
}

#[tokio::test]
async fn test_build_context_gets_disabled_provider() {
    let config = AppConfig {
        supabase: None,
        ..AppConfig::default()
    };

    let client = session_client(&config, ClientContext::Build).unwrap();
    let mut cookies = bridge(&[]);

    assert!(client.get_session(&mut cookies).await.unwrap().is_none());
    assert_eq!(
        client.exchange_code("code", &mut cookies).await.err(),
        Some(SessionError::Disabled)
    );
}

#[test]
fn test_interactive_context_fails_without_settings() {
    let config = AppConfig {
        supabase: None,
        ..AppConfig::default()
    };

    let error = session_client(&config, ClientContext::Interactive).err();

    assert_eq!(
        error,
        Some(ConfigError::Missing("SUPABASE_URL and SUPABASE_ANON_KEY"))
    );
}

#[test]
fn test_configured_client_is_built_in_any_context() {
    let config = AppConfig::default();
    assert!(session_client(&config, ClientContext::Interactive).is_ok());
    assert!(session_client(&config, ClientContext::Build).is_ok());
}

#[tokio::test]
async fn test_disabled_provider_sign_out_is_a_no_op() {
    let mut cookies = bridge(&[]);
    DisabledSessionProvider.sign_out(&mut cookies).await.unwrap();
    assert!(cookies.mutations().is_empty());
}
