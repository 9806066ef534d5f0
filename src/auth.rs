use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::{
    models::{Profile, UserIdentity},
    profile::{ProfileState, ProfileStore},
    session::SessionSnapshot,
};

/// AuthContext
///
/// Identity and profile of the current user as the gates see them. `loading` mirrors the
/// browser-side provider's state before both are known; a context resolved on the server
/// is never loading.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub user: Option<UserIdentity>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl AuthContext {
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    /// resolve
    ///
    /// Loads the profile for `user`, if any. A failing store leaves the profile unknown
    /// rather than failing the request; the verification gate does not redirect without a
    /// profile.
    pub async fn resolve(user: Option<UserIdentity>, store: &dyn ProfileStore) -> Self {
        let Some(user) = user else {
            return Self::default();
        };

        let profile = match store.get_profile(user.id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(user_id = %user.id, "profile lookup failed: {e}");
                None
            }
        };

        Self {
            user: Some(user),
            profile,
            loading: false,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.email.as_str())
    }
}

/// Case-insensitive super-admin match used by the verification gate.
pub fn is_super_admin(user: &UserIdentity, super_admin_email: &str) -> bool {
    user.email.eq_ignore_ascii_case(super_admin_email)
}

/// AuthContext Extractor
///
/// Reuses a context an earlier layer already attached; otherwise builds one from the
/// session the edge gatekeeper observed and the profile store in the application state.
/// Never rejects: anonymous requests get an empty context.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
    ProfileState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<AuthContext>() {
            return Ok(ctx.clone());
        }

        let user = parts
            .extensions
            .get::<SessionSnapshot>()
            .and_then(|snapshot| snapshot.0.as_ref())
            .map(|session| session.user.clone());

        let store = ProfileState::from_ref(state);
        Ok(AuthContext::resolve(user, store.as_ref()).await)
    }
}
