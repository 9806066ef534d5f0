use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, SET_COOKIE},
};
use thiserror::Error;

use crate::models::Session;

/// SessionError
///
/// Failures of the identity provider collaborator. None of them is fatal to a request:
/// the gatekeeper logs and continues as if no session existed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("identity provider unreachable: {0}")]
    Transport(String),
    #[error("identity provider rejected the request: {0}")]
    Rejected(String),
    #[error("access token invalid: {0}")]
    InvalidToken(String),
    #[error("no PKCE code verifier cookie present")]
    MissingVerifier,
    #[error("identity provider is not configured in this context")]
    Disabled,
}

// 1. Cookie Capability

/// CookieMutation
///
/// A write the provider asked for while handling the request. `max_age == Some(0)` is a
/// removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieMutation {
    pub name: String,
    pub value: String,
    pub max_age: Option<i64>,
}

impl CookieMutation {
    pub fn is_removal(&self) -> bool {
        self.max_age == Some(0)
    }

    /// Renders the `Set-Cookie` header value.
    pub fn to_header(&self, secure: bool) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.name, self.value
        );
        if let Some(max_age) = self.max_age {
            cookie.push_str(&format!("; Max-Age={max_age}"));
        }
        if secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// CookieBridge
///
/// Cookie read/write capability handed to the session provider. Reads see the incoming
/// request cookies overlaid with any writes made so far; writes are collected and later
/// applied to both the forwarded request and the outgoing response, so a token rotated
/// during lookup reaches the handler now and the browser on its next request.
#[derive(Debug, Clone, Default)]
pub struct CookieBridge {
    incoming: Vec<(String, String)>,
    pending: Vec<CookieMutation>,
    secure: bool,
}

impl CookieBridge {
    pub fn from_headers(headers: &HeaderMap, secure: bool) -> Self {
        let incoming = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();

        Self {
            incoming,
            pending: Vec::new(),
            secure,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        if let Some(mutation) = self.pending.iter().find(|m| m.name == name) {
            return (!mutation.is_removal()).then_some(mutation.value.as_str());
        }
        self.incoming
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str, max_age: Option<i64>) {
        self.pending.retain(|m| m.name != name);
        self.pending.push(CookieMutation {
            name: name.to_string(),
            value: value.to_string(),
            max_age,
        });
    }

    pub fn remove(&mut self, name: &str) {
        self.set(name, "", Some(0));
    }

    pub fn mutations(&self) -> &[CookieMutation] {
        &self.pending
    }

    /// Rewrites the request `Cookie` header so downstream handlers observe rotated tokens.
    pub fn apply_to_request(&self, headers: &mut HeaderMap) {
        if self.pending.is_empty() {
            return;
        }

        let mut merged: Vec<(String, String)> = self
            .incoming
            .iter()
            .filter(|(name, _)| !self.pending.iter().any(|m| &m.name == name))
            .cloned()
            .collect();
        merged.extend(
            self.pending
                .iter()
                .filter(|m| !m.is_removal())
                .map(|m| (m.name.clone(), m.value.clone())),
        );

        headers.remove(COOKIE);
        if merged.is_empty() {
            return;
        }
        let joined = merged
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        match HeaderValue::from_str(&joined) {
            Ok(value) => {
                headers.insert(COOKIE, value);
            }
            Err(e) => tracing::warn!("dropping rewritten cookie header: {e}"),
        }
    }

    /// Appends one `Set-Cookie` per pending write.
    pub fn apply_to_response(&self, headers: &mut HeaderMap) {
        for mutation in &self.pending {
            match HeaderValue::from_str(&mutation.to_header(self.secure)) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(cookie = %mutation.name, "invalid Set-Cookie value: {e}"),
            }
        }
    }
}

// 2. Provider Contract

/// SessionProvider
///
/// The external identity provider as seen by the access policy. Implementations may
/// rotate or clear cookies through the bridge as a side effect of any call.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current session, refreshing it if the provider needs to. `Ok(None)` when signed out.
    async fn get_session(&self, cookies: &mut CookieBridge)
    -> Result<Option<Session>, SessionError>;

    /// Completes an OAuth / magic-link sign-in by trading the callback code for a session.
    async fn exchange_code(
        &self,
        code: &str,
        cookies: &mut CookieBridge,
    ) -> Result<Session, SessionError>;

    /// Ends the session at the provider and clears the session cookies.
    async fn sign_out(&self, cookies: &mut CookieBridge) -> Result<(), SessionError>;
}

/// SessionState
///
/// Shared provider handle stored in the application state.
pub type SessionState = Arc<dyn SessionProvider>;

/// SessionSnapshot
///
/// Request extension set by the edge gatekeeper on pass-through: the session it observed,
/// or `None` if there was none, the lookup failed, or a sign-out was in flight.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot(pub Option<Session>);

// 3. Degraded Stand-In

/// DisabledSessionProvider
///
/// Substituted for the real provider when a build-time context lacks provider settings.
/// Everyone is signed out; nobody can sign in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSessionProvider;

#[async_trait]
impl SessionProvider for DisabledSessionProvider {
    async fn get_session(
        &self,
        _cookies: &mut CookieBridge,
    ) -> Result<Option<Session>, SessionError> {
        Ok(None)
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _cookies: &mut CookieBridge,
    ) -> Result<Session, SessionError> {
        Err(SessionError::Disabled)
    }

    async fn sign_out(&self, _cookies: &mut CookieBridge) -> Result<(), SessionError> {
        Ok(())
    }
}

// 4. The Mock Implementation (For Tests)

/// Cookie the mock provider writes on sign-in and clears on sign-out.
pub const MOCK_SESSION_COOKIE: &str = "mock-session";

/// MockSessionProvider
///
/// Deterministic provider for tests: returns a canned session, optionally after a delay,
/// optionally failing, optionally rotating a cookie on every lookup. Counts lookups so
/// tests can assert when the provider was never consulted.
#[derive(Clone, Default)]
pub struct MockSessionProvider {
    pub session: Option<Session>,
    pub delay: Option<Duration>,
    pub should_fail: bool,
    pub rotation: Option<(String, String)>,
    lookups: Arc<AtomicUsize>,
}

impl MockSessionProvider {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(session: Session) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_rotation(mut self, name: &str, value: &str) -> Self {
        self.rotation = Some((name.to_string(), value.to_string()));
        self
    }

    /// Number of `get_session` calls made so far, across clones.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    async fn get_session(
        &self,
        cookies: &mut CookieBridge,
    ) -> Result<Option<Session>, SessionError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail {
            return Err(SessionError::Transport(
                "Mock Session Error: Simulation requested".to_string(),
            ));
        }
        if let Some((name, value)) = &self.rotation {
            cookies.set(name, value, Some(3600));
        }
        Ok(self.session.clone())
    }

    async fn exchange_code(
        &self,
        code: &str,
        cookies: &mut CookieBridge,
    ) -> Result<Session, SessionError> {
        if self.should_fail {
            return Err(SessionError::Rejected(format!("code {code} refused")));
        }
        let session = self
            .session
            .clone()
            .ok_or_else(|| SessionError::Rejected(format!("code {code} refused")))?;
        cookies.set(MOCK_SESSION_COOKIE, &session.access_token, Some(3600));
        Ok(session)
    }

    async fn sign_out(&self, cookies: &mut CookieBridge) -> Result<(), SessionError> {
        cookies.remove(MOCK_SESSION_COOKIE);
        Ok(())
    }
}
