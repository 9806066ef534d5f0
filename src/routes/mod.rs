/// Router Module Index
///
/// Pages are split by how the edge treats them; all page routers sit behind the
/// verification gate. Auth plumbing and the JSON API sit behind the edge only.

/// Pages anyone may open; `/login` and `/signup` bounce signed-in users to the dashboard.
pub mod public;

/// Pages that require a session at the edge.
pub mod authenticated;

/// The admin subtree, guarded at render time.
pub mod admin;

/// Sign-in completion and sign-out.
pub mod auth;

/// JSON endpoints for browser-side gating.
pub mod api;
