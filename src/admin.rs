use crate::{auth::AuthContext, paths::HOME_PATH};

/// Label shown in the denied view when nobody is signed in.
pub const GUEST_LABEL: &str = "Guest";

/// AdminView
///
/// What the admin subtree renders for the current auth state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminView {
    Loading,
    Authorized,
    Denied {
        home_href: &'static str,
        signed_in_as: String,
    },
}

/// admin_guard
///
/// Render-level guard for admin pages. Authorization is an exact email match against the
/// configured super-admin; unlike the verification gate there is no case folding. No
/// redirect and no lookups happen here.
pub fn admin_guard(ctx: &AuthContext, super_admin_email: &str) -> AdminView {
    if ctx.loading {
        return AdminView::Loading;
    }
    match ctx.email() {
        Some(email) if email == super_admin_email => AdminView::Authorized,
        email => AdminView::Denied {
            home_href: HOME_PATH,
            signed_in_as: email
                .filter(|email| !email.is_empty())
                .unwrap_or(GUEST_LABEL)
                .to_string(),
        },
    }
}
