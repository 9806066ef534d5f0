use std::sync::Arc;

use thiserror::Error;

/// Redirect target for unauthenticated access to a protected page.
pub const LOGIN_PATH: &str = "/login";
/// Redirect target for authenticated access to an auth-only page.
pub const DASHBOARD_PATH: &str = "/dashboard";
/// Redirect target for unverified users.
pub const VERIFY_PATH: &str = "/verify";
pub const HOME_PATH: &str = "/";

/// Paths a user must be able to reach before their profile can be approved.
pub const PRE_APPROVAL_PATHS: &[&str] = &["/verify", "/login", "/signup", "/", "/auth/callback"];

/// How a rule's pattern is compared against a request path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Match {
    /// `path.starts_with(pattern)`.
    Prefix,
    /// `path == pattern`.
    Exact,
}

/// PathRule
///
/// One row of the shared classification table. A path may carry several flags at once:
/// `/settings` is protected at the edge and exempt from verification, `/login` is
/// auth-only and exempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathRule {
    pub pattern: &'static str,
    pub matching: Match,
    pub protected: bool,
    pub auth_only: bool,
    pub verification_exempt: bool,
}

impl PathRule {
    pub const fn new(pattern: &'static str, matching: Match) -> Self {
        Self {
            pattern,
            matching,
            protected: false,
            auth_only: false,
            verification_exempt: false,
        }
    }

    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    pub const fn auth_only(mut self) -> Self {
        self.auth_only = true;
        self
    }

    pub const fn exempt(mut self) -> Self {
        self.verification_exempt = true;
        self
    }

    pub fn matches(&self, path: &str) -> bool {
        match self.matching {
            Match::Prefix => path.starts_with(self.pattern),
            Match::Exact => path == self.pattern,
        }
    }
}

/// Edge-level access class of a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteAccess {
    Protected,
    AuthOnly,
    Open,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathTableError {
    #[error("{0} is reachable before approval but is not exempt from verification")]
    PreApprovalNotExempt(&'static str),
    #[error("auth-only path {0} is not exempt from verification")]
    AuthOnlyNotExempt(&'static str),
    #[error("redirect target {0} would redirect again")]
    RedirectLoop(&'static str),
}

/// PathTable
///
/// The single declarative table both the edge gatekeeper and the verification gate read.
/// Also carries the edge matcher configuration: paths the gatekeeper never evaluates.
#[derive(Clone, Debug)]
pub struct PathTable {
    rules: Vec<PathRule>,
    edge_skip_prefixes: Vec<&'static str>,
    edge_skip_extensions: Vec<&'static str>,
}

/// Shared handle stored in the application state.
pub type PathTableState = Arc<PathTable>;

impl Default for PathTable {
    fn default() -> Self {
        Self::new(vec![
            PathRule::new("/dashboard", Match::Prefix).protected(),
            PathRule::new("/create", Match::Prefix).protected(),
            PathRule::new("/messages", Match::Prefix).protected(),
            PathRule::new("/settings", Match::Prefix).protected().exempt(),
            PathRule::new("/login", Match::Prefix).auth_only().exempt(),
            PathRule::new("/signup", Match::Prefix).auth_only().exempt(),
            PathRule::new("/verify", Match::Prefix).exempt(),
            PathRule::new("/", Match::Exact).exempt(),
            PathRule::new("/auth/callback", Match::Prefix).exempt(),
            PathRule::new("/admin", Match::Prefix).exempt(),
            PathRule::new("/browse", Match::Prefix).exempt(),
        ])
    }
}

impl PathTable {
    pub fn new(rules: Vec<PathRule>) -> Self {
        Self {
            rules,
            edge_skip_prefixes: vec!["/_next/static", "/_next/image", "/favicon.ico"],
            edge_skip_extensions: vec![".svg", ".png", ".jpg", ".jpeg", ".gif", ".webp"],
        }
    }

    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }

    fn any(&self, path: &str, flag: impl Fn(&PathRule) -> bool) -> bool {
        self.rules.iter().any(|rule| flag(rule) && rule.matches(path))
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.any(path, |rule| rule.protected)
    }

    pub fn is_auth_only(&self, path: &str) -> bool {
        self.any(path, |rule| rule.auth_only)
    }

    pub fn is_verification_exempt(&self, path: &str) -> bool {
        self.any(path, |rule| rule.verification_exempt)
    }

    /// classify
    ///
    /// Edge classification. Protected wins over auth-only should a table ever mark a path
    /// as both; `validate` does not forbid it, but the default table never does it.
    pub fn classify(&self, path: &str) -> RouteAccess {
        if self.is_protected(path) {
            RouteAccess::Protected
        } else if self.is_auth_only(path) {
            RouteAccess::AuthOnly
        } else {
            RouteAccess::Open
        }
    }

    /// True for static assets and image internals the gatekeeper must never see.
    pub fn is_edge_excluded(&self, path: &str) -> bool {
        self.edge_skip_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
            || self
                .edge_skip_extensions
                .iter()
                .any(|ext| path.ends_with(ext))
    }

    /// validate
    ///
    /// Checks the agreements between the two gate layers that, when broken, lock users out
    /// or bounce them between redirects:
    /// - every pre-approval path is verification-exempt;
    /// - every auth-only path is verification-exempt;
    /// - no redirect target (`/login`, `/dashboard`, `/verify`) redirects again at the edge.
    pub fn validate(&self) -> Result<(), PathTableError> {
        for &path in PRE_APPROVAL_PATHS {
            if !self.is_verification_exempt(path) {
                return Err(PathTableError::PreApprovalNotExempt(path));
            }
        }

        for rule in self.rules.iter().filter(|rule| rule.auth_only) {
            if !rule.verification_exempt {
                return Err(PathTableError::AuthOnlyNotExempt(rule.pattern));
            }
        }

        if self.is_protected(LOGIN_PATH) {
            return Err(PathTableError::RedirectLoop(LOGIN_PATH));
        }
        if self.is_auth_only(DASHBOARD_PATH) {
            return Err(PathTableError::RedirectLoop(DASHBOARD_PATH));
        }
        if self.is_auth_only(VERIFY_PATH) {
            return Err(PathTableError::RedirectLoop(VERIFY_PATH));
        }

        Ok(())
    }
}
