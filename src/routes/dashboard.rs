//! Guarded dashboard routes and the role-based dashboard router.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::{Html, IntoResponse, Json, Redirect, Response};
use serde::Serialize;

use super::auth::{CurrentSession, forget_stale_cookie};
use crate::gate::{self, Gate, NavLink};
use crate::model::{Role, User};
use crate::state::AppState;

pub const ACCESS_DENIED: &str = "Access Denied";

/// Shared chrome wrapped around every guarded page.
#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub dashboard: &'static str,
    pub user: User,
    pub navigation: Vec<NavLink>,
}

fn loading_response() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, [(RETRY_AFTER, "1")], Json(serde_json::json!({ "status": "loading" })))
        .into_response()
}

fn access_denied_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({
            "error": ACCESS_DENIED,
            "message": "You do not have permission to view this page.",
        })),
    )
        .into_response()
}

/// Unwrap an allowed user, or produce the loading, redirect, or denial
/// response for the other outcomes.
pub(crate) fn admit(gate: Gate<'_>) -> Result<&User, Response> {
    match gate {
        Gate::Allow(user) => Ok(user),
        Gate::Loading => Err(loading_response()),
        Gate::Login => Err(Redirect::to(&gate::login_redirect_location()).into_response()),
        Gate::Denied => Err(access_denied_response()),
    }
}

/// `GET /dashboard`: redirect to the dashboard for the current role.
pub async fn dashboard_router(State(state): State<AppState>, session: CurrentSession) -> Response {
    let response = match admit(gate::require_auth(&session.snapshot.state)) {
        Ok(user) => Redirect::to(gate::dashboard_target(user.role, state.settings.unknown_role_policy)).into_response(),
        Err(response) => response,
    };
    forget_stale_cookie(&session, state.settings.cookie_secure, response)
}

fn render(state: &AppState, session: &CurrentSession, dashboard: Role) -> Response {
    let gate = gate::require_dashboard(&session.snapshot.state, dashboard, state.settings.unknown_role_policy);
    let response = match admit(gate) {
        Ok(user) => Json(DashboardView {
            dashboard: dashboard.as_str(),
            user: user.clone(),
            navigation: gate::navigation_for(user.role),
        })
        .into_response(),
        Err(response) => response,
    };
    forget_stale_cookie(session, state.settings.cookie_secure, response)
}

/// `GET /dashboard/researcher`
pub async fn researcher_dashboard(State(state): State<AppState>, session: CurrentSession) -> Response {
    render(&state, &session, Role::Researcher)
}

/// `GET /dashboard/grant-office`
pub async fn grant_office_dashboard(State(state): State<AppState>, session: CurrentSession) -> Response {
    render(&state, &session, Role::GrantOffice)
}

/// `GET /dashboard/admin`
pub async fn admin_dashboard(State(state): State<AppState>, session: CurrentSession) -> Response {
    render(&state, &session, Role::Admin)
}

/// `GET /unauthorized`: terminal page for accounts without a usable role.
pub async fn unauthorized() -> Response {
    (
        StatusCode::FORBIDDEN,
        Html(
            "<!doctype html><title>Access Denied</title>\
             <h1>Access Denied</h1>\
             <p>Your account does not have a role that grants access to a dashboard. \
             Contact the grant office to have one assigned.</p>",
        ),
    )
        .into_response()
}

#[cfg(test)]
#[path = "dashboard_test.rs"]
mod tests;
