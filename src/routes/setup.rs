//! First-run setup route.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use tracing::warn;

use super::error_response;
use crate::services::setup::SetupError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateAdminBody {
    pub password: String,
}

pub(crate) fn setup_error_to_status(err: &SetupError) -> StatusCode {
    match err {
        SetupError::EmptyPassword | SetupError::Rejected(_) => StatusCode::BAD_REQUEST,
        SetupError::Request(_) => StatusCode::BAD_GATEWAY,
        SetupError::HttpClientBuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /api/setup/admin`: provision the configured admin account.
pub async fn create_admin(State(state): State<AppState>, Json(body): Json<CreateAdminBody>) -> Response {
    let Some(setup) = &state.setup else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "admin setup not configured");
    };
    match setup.create_admin(&body.password).await {
        Ok(()) => (StatusCode::CREATED, Json(serde_json::json!({ "email": setup.admin_email() }))).into_response(),
        Err(e) => {
            warn!(error = %e, "admin setup failed");
            error_response(setup_error_to_status(&e), &e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "setup_test.rs"]
mod tests;
