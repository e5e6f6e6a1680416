//! Admin user-management routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Json, Response};
use tracing::info;
use uuid::Uuid;

use super::auth::CurrentSession;
use super::dashboard::admit;
use super::error_response;
use crate::gate;
use crate::model::{Profile, Role};
use crate::services::profile::{ProfileError, ProfileUpdate};
use crate::services::session::AuthEvent;
use crate::state::AppState;

fn profile_error_response(err: &ProfileError) -> Response {
    match err {
        ProfileError::NotFound(_) => error_response(StatusCode::NOT_FOUND, &err.to_string()),
        ProfileError::Db(e) => {
            tracing::error!(error = %e, "profile query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "profile store unavailable")
        }
    }
}

/// `GET /api/admin/users`: every profile row.
pub async fn list_users(State(state): State<AppState>, session: CurrentSession) -> Result<Json<Vec<Profile>>, Response> {
    admit(gate::require_auth_and_role(&session.snapshot.state, &[Role::Admin]))?;
    let profiles = state
        .profiles()
        .list_profiles()
        .await
        .map_err(|e| profile_error_response(&e))?;
    Ok(Json(profiles))
}

/// `PATCH /api/admin/users/:id`: edit name, role, or department, then
/// refresh that user's live sessions.
pub async fn update_user(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(user_id): Path<Uuid>,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<Profile>, Response> {
    let admin = admit(gate::require_auth_and_role(&session.snapshot.state, &[Role::Admin]))?;

    if let Some(role) = body.role.as_deref() {
        if Role::from_str(role).is_none() {
            return Err(error_response(StatusCode::BAD_REQUEST, &format!("unknown role: {role}")));
        }
    }

    let profile = state
        .profiles()
        .update_profile(user_id, &body)
        .await
        .map_err(|e| profile_error_response(&e))?;
    let notified = state
        .sessions
        .notify_user(user_id, &AuthEvent::UserUpdated(user_id))
        .await;

    info!(admin_id = %admin.id, %user_id, role = %profile.role, notified, "profile updated");
    Ok(Json(profile))
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod tests;
