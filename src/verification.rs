use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    AppState,
    auth::{AuthContext, is_super_admin},
    models::{GateDecision, GateOutcomeKind, Profile, UserIdentity},
    pages,
    paths::{PathTable, VERIFY_PATH},
};

/// GateInput
///
/// A snapshot of everything the verification gate depends on.
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub user: Option<&'a UserIdentity>,
    pub profile: Option<&'a Profile>,
    pub loading: bool,
    pub path: &'a str,
}

impl<'a> GateInput<'a> {
    pub fn from_context(ctx: &'a AuthContext, path: &'a str) -> Self {
        Self {
            user: ctx.user.as_ref(),
            profile: ctx.profile.as_ref(),
            loading: ctx.loading,
            path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Auth state still loading: show the loading indicator instead of the page.
    Loading,
    /// Render the page as-is.
    Render,
    /// Navigate away.
    Redirect(&'static str),
}

impl GateOutcome {
    pub fn to_decision(self, path: &str) -> GateDecision {
        let (outcome, redirect_to) = match self {
            GateOutcome::Loading => (GateOutcomeKind::Loading, None),
            GateOutcome::Render => (GateOutcomeKind::Render, None),
            GateOutcome::Redirect(target) => (GateOutcomeKind::Redirect, Some(target.to_string())),
        };
        GateDecision {
            path: path.to_string(),
            outcome,
            redirect_to,
        }
    }
}

/// evaluate
///
/// The verification rule. Redirects to `/verify` only when the auth state has loaded, a
/// user is signed in, the path is not exempt, the user is not the super-admin, and a
/// loaded profile is not approved.
pub fn evaluate(input: &GateInput<'_>, table: &PathTable, super_admin_email: &str) -> GateOutcome {
    if input.loading {
        return GateOutcome::Loading;
    }
    let Some(user) = input.user else {
        return GateOutcome::Render;
    };
    if table.is_verification_exempt(input.path) || is_super_admin(user, super_admin_email) {
        return GateOutcome::Render;
    }
    match input.profile {
        Some(profile) if !profile.verification_status.is_approved() => {
            GateOutcome::Redirect(VERIFY_PATH)
        }
        _ => GateOutcome::Render,
    }
}

/// Navigator
///
/// The navigation side effect of a UI host (router push, location change).
pub trait Navigator {
    fn navigate(&mut self, target: &str);
}

/// VerificationGate
///
/// Stateful wrapper for hosts that re-run the gate on every change of identity, profile,
/// loading flag or path. Re-evaluating an unchanged input yields the same outcome without
/// a second navigation.
#[derive(Debug, Clone)]
pub struct VerificationGate {
    super_admin_email: String,
    // (path, target) of the last navigation issued.
    last_redirect: Option<(String, &'static str)>,
}

impl VerificationGate {
    pub fn new(super_admin_email: impl Into<String>) -> Self {
        Self {
            super_admin_email: super_admin_email.into(),
            last_redirect: None,
        }
    }

    pub fn on_change(
        &mut self,
        input: &GateInput<'_>,
        table: &PathTable,
        navigator: &mut dyn Navigator,
    ) -> GateOutcome {
        let outcome = evaluate(input, table, &self.super_admin_email);

        match outcome {
            GateOutcome::Redirect(target) => {
                let already_sent = self
                    .last_redirect
                    .as_ref()
                    .is_some_and(|(path, sent)| path == input.path && *sent == target);
                if !already_sent {
                    tracing::debug!(path = %input.path, %target, "verification gate redirect");
                    navigator.navigate(target);
                    self.last_redirect = Some((input.path.to_string(), target));
                }
            }
            GateOutcome::Render => self.last_redirect = None,
            GateOutcome::Loading => {}
        }

        outcome
    }
}

/// verification_middleware
///
/// Runs the gate for server-rendered pages. A redirect becomes a 307 to `/verify`; a
/// loading context renders the loading view; otherwise the resolved context is attached
/// for the page handler.
pub async fn verification_middleware(
    State(state): State<AppState>,
    ctx: AuthContext,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let input = GateInput::from_context(&ctx, &path);

    match evaluate(&input, &state.paths, &state.config.super_admin_email) {
        GateOutcome::Redirect(target) => {
            tracing::info!(%path, %target, "unverified user redirected");
            Redirect::temporary(target).into_response()
        }
        GateOutcome::Loading => pages::loading().into_response(),
        GateOutcome::Render => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
    }
}
