//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! JSON API routes for session lifecycle and admin edits, guarded dashboard
//! routes, and the public pages served as static files from `WEB_DIR`.

pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod setup;

use std::path::Path;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, patch, post};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState, web_dir: &Path) -> Router {
    let page = |name: &str| ServeFile::new(web_dir.join(name));
    let static_files = ServeDir::new(web_dir).not_found_service(ServeFile::new(web_dir.join("404.html")));

    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/clear-cache", post(auth::clear_cache))
        .route("/api/auth/recover", post(auth::recover))
        .route("/api/auth/me", get(auth::me))
        .route("/api/setup/admin", post(setup::create_admin))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{id}", patch(admin::update_user))
        .route("/dashboard", get(dashboard::dashboard_router))
        .route("/dashboard/researcher", get(dashboard::researcher_dashboard))
        .route("/dashboard/grant-office", get(dashboard::grant_office_dashboard))
        .route("/dashboard/admin", get(dashboard::admin_dashboard))
        .route("/unauthorized", get(dashboard::unauthorized))
        .route("/healthz", get(healthz))
        .route_service("/", page("index.html"))
        .route_service("/login", page("login.html"))
        .route_service("/register", page("register.html"))
        .route_service("/forgot-password", page("forgot-password.html"))
        .route_service("/setup", page("setup.html"))
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error body shown to the user as a toast.
pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
