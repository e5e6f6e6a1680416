//! Access gate: render, redirect, or deny decisions over an auth snapshot.
//!
//! DESIGN
//! ======
//! Decisions are pure functions of `AuthState` so they can be tested without
//! a router. `routes::dashboard` turns them into HTTP responses.

use crate::model::{Role, User};
use crate::services::session::AuthState;

pub const LOGIN_PATH: &str = "/login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";
pub const LOGIN_MESSAGE: &str = "Please log in to access this page";

/// What to do with a user whose role is missing or unrecognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownRolePolicy {
    /// Send them to the unauthorized page.
    #[default]
    Deny,
    /// Legacy behavior: treat them as a researcher.
    Researcher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate<'a> {
    /// Auth state not settled yet; render neither content nor redirect.
    Loading,
    /// Not authenticated; redirect to the login page.
    Login,
    /// Authenticated but not allowed; render an inline denial.
    Denied,
    Allow(&'a User),
}

/// Gate for any authenticated route.
#[must_use]
pub fn require_auth(state: &AuthState) -> Gate<'_> {
    match state {
        AuthState::Loading => Gate::Loading,
        AuthState::Unauthenticated => Gate::Login,
        AuthState::Authenticated(auth) => Gate::Allow(&auth.user),
    }
}

/// Gate for a role-restricted subtree. Never redirects.
#[must_use]
pub fn require_role<'a>(state: &'a AuthState, allowed: &[Role]) -> Gate<'a> {
    match state {
        AuthState::Loading => Gate::Loading,
        AuthState::Unauthenticated => Gate::Denied,
        AuthState::Authenticated(auth) => match auth.user.role {
            Some(role) if allowed.contains(&role) => Gate::Allow(&auth.user),
            _ => Gate::Denied,
        },
    }
}

/// `require_auth` followed by `require_role`, as nested guards would run.
#[must_use]
pub fn require_auth_and_role<'a>(state: &'a AuthState, allowed: &[Role]) -> Gate<'a> {
    match require_auth(state) {
        Gate::Allow(_) => require_role(state, allowed),
        other => other,
    }
}

/// Guard for one dashboard subtree. Under the legacy policy a user without a
/// recognized role is let into the researcher dashboard.
#[must_use]
pub fn require_dashboard(state: &AuthState, dashboard: Role, policy: UnknownRolePolicy) -> Gate<'_> {
    match require_auth_and_role(state, allowed_roles(dashboard)) {
        Gate::Denied if dashboard == Role::Researcher && policy == UnknownRolePolicy::Researcher => match state {
            AuthState::Authenticated(auth) if auth.user.role.is_none() => Gate::Allow(&auth.user),
            _ => Gate::Denied,
        },
        other => other,
    }
}

// =============================================================================
// DASHBOARD ROUTING
// =============================================================================

#[must_use]
pub fn dashboard_path(role: Role) -> &'static str {
    match role {
        Role::Researcher => "/dashboard/researcher",
        Role::GrantOffice => "/dashboard/grant-office",
        Role::Admin => "/dashboard/admin",
    }
}

/// Where the dashboard router sends a user with `role`.
#[must_use]
pub fn dashboard_target(role: Option<Role>, policy: UnknownRolePolicy) -> &'static str {
    match (role, policy) {
        (Some(role), _) => dashboard_path(role),
        (None, UnknownRolePolicy::Researcher) => dashboard_path(Role::Researcher),
        (None, UnknownRolePolicy::Deny) => UNAUTHORIZED_PATH,
    }
}

/// `dashboard_target` for a raw stored role string.
#[must_use]
pub fn dashboard_target_for_label(label: &str, policy: UnknownRolePolicy) -> &'static str {
    dashboard_target(Role::from_str(label), policy)
}

/// Login redirect carrying the explanation shown above the form.
#[must_use]
pub fn login_redirect_location() -> String {
    format!("{LOGIN_PATH}?message={}", LOGIN_MESSAGE.replace(' ', "%20"))
}

// =============================================================================
// NAVIGATION
// =============================================================================

/// Dashboard link shown in the shared chrome.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NavLink {
    pub label: &'static str,
    pub path: &'static str,
}

/// Roles allowed into each dashboard subtree.
#[must_use]
pub fn allowed_roles(dashboard: Role) -> &'static [Role] {
    match dashboard {
        Role::Researcher => &[Role::Researcher],
        Role::GrantOffice => &[Role::GrantOffice, Role::Admin],
        Role::Admin => &[Role::Admin],
    }
}

/// Links for every dashboard `role` may enter.
#[must_use]
pub fn navigation_for(role: Option<Role>) -> Vec<NavLink> {
    let Some(role) = role else {
        return Vec::new();
    };
    Role::ALL
        .into_iter()
        .filter(|dashboard| allowed_roles(*dashboard).contains(&role))
        .map(|dashboard| NavLink {
            label: match dashboard {
                Role::Researcher => "Researcher Dashboard",
                Role::GrantOffice => "Grant Office Dashboard",
                Role::Admin => "Admin Dashboard",
            },
            path: dashboard_path(dashboard),
        })
        .collect()
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;
