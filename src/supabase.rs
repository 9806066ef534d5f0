use std::sync::Arc;

use async_trait::async_trait;
use base64ct::{Base64Url, Base64UrlUnpadded, Encoding};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::{
    config::{AppConfig, ClientContext, ConfigError, SupabaseSettings},
    models::{Session, UserIdentity},
    session::{CookieBridge, DisabledSessionProvider, SessionError, SessionProvider, SessionState},
};

/// Audience claim on every access token issued to a signed-in user.
pub const TOKEN_AUDIENCE: &str = "authenticated";

// Session cookies outlive access tokens; the provider's own helpers use 400 days.
const SESSION_COOKIE_MAX_AGE: i64 = 400 * 24 * 60 * 60;
const COOKIE_VALUE_PREFIX: &str = "base64-";
// Values above this are split into `.0`, `.1`, … so each stays under the browser's 4 KB cap.
pub const MAX_COOKIE_CHUNK_SIZE: usize = 3180;

/// AccessTokenClaims
///
/// Payload of a provider access token. Verified locally with the project's JWT secret, so
/// a lookup only goes over the network when the token needs refreshing.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub aud: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default)]
    pub role: Option<String>,
}

/// StoredSession
///
/// JSON body of the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Encodes a stored session the way the provider's cookie helpers do.
pub fn encode_session_cookie(stored: &StoredSession) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(stored)?;
    Ok(format!(
        "{COOKIE_VALUE_PREFIX}{}",
        Base64UrlUnpadded::encode_string(&json)
    ))
}

/// Decodes a session cookie; `None` for anything that is not a well-formed stored session.
/// Plain (un-prefixed) JSON values from older clients are accepted too.
pub fn decode_session_cookie(raw: &str) -> Option<StoredSession> {
    let bytes = match raw.strip_prefix(COOKIE_VALUE_PREFIX) {
        Some(encoded) => Base64UrlUnpadded::decode_vec(encoded)
            .or_else(|_| Base64Url::decode_vec(encoded))
            .ok()?,
        None => raw.as_bytes().to_vec(),
    };
    serde_json::from_slice(&bytes).ok()
}

/// Cookie name derived from the project URL: `sb-<first host label>-auth-token`.
pub fn session_cookie_name(project_url: &str) -> Result<String, ConfigError> {
    let url = Url::parse(project_url).map_err(|e| ConfigError::Invalid {
        var: "SUPABASE_URL",
        reason: e.to_string(),
    })?;
    let host = url.host_str().ok_or_else(|| ConfigError::Invalid {
        var: "SUPABASE_URL",
        reason: "URL has no host".to_string(),
    })?;
    let project_ref = host.split('.').next().unwrap_or(host);
    Ok(format!("sb-{project_ref}-auth-token"))
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: ProviderUser,
}

/// SupabaseSessionProvider
///
/// Session provider backed by the hosted auth API. Reads and rotates the
/// `sb-<ref>-auth-token` cookie, verifies access tokens locally and only calls the API to
/// refresh, exchange a PKCE code, or sign out.
pub struct SupabaseSessionProvider {
    http: reqwest::Client,
    settings: SupabaseSettings,
    cookie_name: String,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SupabaseSessionProvider {
    pub fn new(settings: SupabaseSettings) -> Result<Self, ConfigError> {
        let cookie_name = session_cookie_name(&settings.url)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.validate_exp = true;
        validation.leeway = 0;

        Ok(Self {
            http: reqwest::Client::new(),
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            settings,
            cookie_name,
            validation,
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn verifier_cookie_name(&self) -> String {
        format!("{}-code-verifier", self.cookie_name)
    }

    fn chunk_name(&self, index: usize) -> String {
        format!("{}.{index}", self.cookie_name)
    }

    /// Whole cookie value, reassembling `.0`, `.1`, … chunks when the value was split.
    fn read_cookie(&self, cookies: &CookieBridge) -> Option<String> {
        if let Some(value) = cookies.get(&self.cookie_name) {
            return Some(value.to_string());
        }
        let mut joined = String::new();
        let mut index = 0;
        while let Some(chunk) = cookies.get(&self.chunk_name(index)) {
            joined.push_str(chunk);
            index += 1;
        }
        (!joined.is_empty()).then_some(joined)
    }

    fn clear_cookie(&self, cookies: &mut CookieBridge) {
        let mut index = 0;
        while cookies.get(&self.chunk_name(index)).is_some() {
            cookies.remove(&self.chunk_name(index));
            index += 1;
        }
        cookies.remove(&self.cookie_name);
    }

    /// Writes the whole value, chunked when it would not fit in one cookie.
    fn write_cookie(&self, cookies: &mut CookieBridge, value: &str) {
        if value.len() <= MAX_COOKIE_CHUNK_SIZE {
            cookies.set(&self.cookie_name, value, Some(SESSION_COOKIE_MAX_AGE));
            return;
        }
        // The encoded value is ASCII, so byte offsets are char boundaries.
        let mut start = 0;
        let mut index = 0;
        while start < value.len() {
            let end = (start + MAX_COOKIE_CHUNK_SIZE).min(value.len());
            cookies.set(
                &self.chunk_name(index),
                &value[start..end],
                Some(SESSION_COOKIE_MAX_AGE),
            );
            start = end;
            index += 1;
        }
    }

    fn verify(&self, access_token: &str) -> Result<UserIdentity, jsonwebtoken::errors::Error> {
        let data = decode::<AccessTokenClaims>(access_token, &self.decoding_key, &self.validation)?;
        Ok(UserIdentity {
            id: data.claims.sub,
            email: data.claims.email.unwrap_or_default(),
        })
    }

    /// Writes freshly issued tokens onto the cookie and returns the session they describe.
    fn store(&self, cookies: &mut CookieBridge, tokens: TokenResponse) -> Session {
        let expires_at = tokens
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + tokens.expires_in);
        let stored = StoredSession {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at,
        };

        self.clear_cookie(cookies);
        match encode_session_cookie(&stored) {
            Ok(value) => self.write_cookie(cookies, &value),
            Err(e) => tracing::error!("failed to encode session cookie: {e}"),
        }

        Session {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            expires_at,
            user: UserIdentity {
                id: tokens.user.id,
                email: tokens.user.email.unwrap_or_default(),
            },
        }
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<TokenResponse, SessionError> {
        let response = self
            .http
            .post(format!(
                "{}/auth/v1/token?grant_type={grant_type}",
                self.settings.url
            ))
            .header("apikey", &self.settings.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let reason = response.text().await.unwrap_or_default();
            return Err(SessionError::Rejected(format!("{status}: {reason}")));
        }
        if !status.is_success() {
            return Err(SessionError::Transport(format!("unexpected status {status}")));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }
}

#[async_trait]
impl SessionProvider for SupabaseSessionProvider {
    async fn get_session(
        &self,
        cookies: &mut CookieBridge,
    ) -> Result<Option<Session>, SessionError> {
        let Some(raw) = self.read_cookie(cookies) else {
            return Ok(None);
        };

        let Some(stored) = decode_session_cookie(&raw) else {
            tracing::warn!(cookie = %self.cookie_name, "malformed session cookie, clearing it");
            self.clear_cookie(cookies);
            return Ok(None);
        };

        match self.verify(&stored.access_token) {
            Ok(user) => Ok(Some(Session {
                access_token: stored.access_token,
                refresh_token: stored.refresh_token,
                expires_at: stored.expires_at,
                user,
            })),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                tracing::debug!("access token expired, refreshing session");
                let grant = serde_json::json!({ "refresh_token": stored.refresh_token });
                match self.token_grant("refresh_token", grant).await {
                    Ok(tokens) => Ok(Some(self.store(cookies, tokens))),
                    Err(SessionError::Rejected(reason)) => {
                        tracing::info!("refresh token rejected, clearing session: {reason}");
                        self.clear_cookie(cookies);
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(SessionError::InvalidToken(e.to_string())),
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        cookies: &mut CookieBridge,
    ) -> Result<Session, SessionError> {
        let verifier_cookie = self.verifier_cookie_name();
        let raw = cookies
            .get(&verifier_cookie)
            .ok_or(SessionError::MissingVerifier)?;

        // The browser helper stores the verifier as a (possibly base64-wrapped) JSON string.
        let verifier = match raw.strip_prefix(COOKIE_VALUE_PREFIX) {
            Some(encoded) => Base64UrlUnpadded::decode_vec(encoded)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or(SessionError::MissingVerifier)?,
            None => raw.to_string(),
        };
        let verifier = verifier.trim_matches('"').to_string();

        let grant = serde_json::json!({ "auth_code": code, "code_verifier": verifier });
        let tokens = self.token_grant("pkce", grant).await?;

        cookies.remove(&verifier_cookie);
        Ok(self.store(cookies, tokens))
    }

    async fn sign_out(&self, cookies: &mut CookieBridge) -> Result<(), SessionError> {
        let access_token = self
            .read_cookie(cookies)
            .and_then(|raw| decode_session_cookie(&raw))
            .map(|stored| stored.access_token);

        // Local cookies go regardless of what the provider says.
        self.clear_cookie(cookies);

        let Some(access_token) = access_token else {
            return Ok(());
        };

        let response = self
            .http
            .post(format!("{}/auth/v1/logout?scope=local", self.settings.url))
            .header("apikey", &self.settings.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        match response.status() {
            // An already-expired token has nothing left to revoke.
            status if status.is_success() || status == StatusCode::UNAUTHORIZED => Ok(()),
            status => Err(SessionError::Rejected(format!("logout returned {status}"))),
        }
    }
}

/// edge_session_provider
///
/// Session source for the serving edge. Missing provider settings are a fatal
/// configuration error here: a listener must never treat every visitor as signed out.
pub fn edge_session_provider(config: &AppConfig) -> Result<SessionState, ConfigError> {
    let settings = config.require_supabase()?;
    Ok(Arc::new(SupabaseSessionProvider::new(settings.clone())?))
}

/// session_client
///
/// Builds a session client for a context that does not serve the edge.
///
/// With provider settings present the real client is returned. Without them, a build-time
/// context gets the `DisabledSessionProvider` stand-in so static generation keeps working,
/// while an interactive context fails with the configuration error.
pub fn session_client(
    config: &AppConfig,
    context: ClientContext,
) -> Result<SessionState, ConfigError> {
    match context {
        ClientContext::Interactive => edge_session_provider(config),
        ClientContext::Build => match config.require_supabase() {
            Ok(settings) => Ok(Arc::new(SupabaseSessionProvider::new(settings.clone())?)),
            Err(e) => {
                tracing::warn!("{e}; using a disabled session provider for this build");
                Ok(Arc::new(DisabledSessionProvider))
            }
        },
    }
}
