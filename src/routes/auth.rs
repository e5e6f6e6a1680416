//! Auth routes: login, logout, registration, cache reset, password recovery.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::{info, warn};

use super::error_response;
use crate::backend::BackendError;
use crate::model::{ProfileStage, User};
use crate::services::session::{self, AuthSnapshot, AuthState, RegisterRequest, SessionError, SessionStore};
use crate::state::AppState;

pub const COOKIE_NAME: &str = "grantdesk_session";

// =============================================================================
// SESSION EXTRACTOR
// =============================================================================

/// Auth snapshot for the requesting browser. Never rejects: a missing cookie
/// reads as unauthenticated, an unknown one as loading while it is checked.
pub struct CurrentSession {
    pub store: Option<Arc<SessionStore>>,
    pub snapshot: AuthSnapshot,
    /// The cookie names a session that has ended; its store was evicted and
    /// the response should clear the cookie.
    pub stale: bool,
}

impl CurrentSession {
    fn anonymous() -> Self {
        Self { store: None, snapshot: AuthSnapshot::unauthenticated(), stale: false }
    }
}

impl<S> FromRequestParts<S> for CurrentSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(token) = jar
            .get(COOKIE_NAME)
            .map(Cookie::value)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
        else {
            return Ok(Self::anonymous());
        };

        let app_state = AppState::from_ref(state);
        let store = app_state.sessions.lookup_or_restore(&token).await;
        let snapshot = store.snapshot();
        let stale = matches!(snapshot.state, AuthState::Unauthenticated)
            && app_state.sessions.evict_signed_out(&token, &store).await;
        Ok(Self { store: Some(store), snapshot, stale })
    }
}

// =============================================================================
// COOKIES / ERRORS
// =============================================================================

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub(crate) fn cleared_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::ZERO)
        .build()
}

/// Attach a cookie-clearing header when `session` named an ended session.
pub(crate) fn forget_stale_cookie(session: &CurrentSession, secure: bool, response: Response) -> Response {
    if session.stale {
        (CookieJar::new().add(cleared_session_cookie(secure)), response).into_response()
    } else {
        response
    }
}

pub(crate) fn backend_error_to_status(err: &BackendError) -> StatusCode {
    match err {
        BackendError::Rejected { status, .. } if err.is_rejection() => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
        }
        BackendError::Rejected { .. } | BackendError::Request(_) | BackendError::Parse(_) => StatusCode::BAD_GATEWAY,
        BackendError::HttpClientBuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn session_error_to_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::EmailDomain { .. } => StatusCode::BAD_REQUEST,
        SessionError::RoleRequiresAdmin(_) => StatusCode::FORBIDDEN,
        SessionError::Backend(e) => backend_error_to_status(e),
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

/// The `{ user, isAuthenticated, isLoading }` triple the UI renders from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub profile_stage: Option<ProfileStage>,
}

impl From<&AuthSnapshot> for MeResponse {
    fn from(snapshot: &AuthSnapshot) -> Self {
        Self {
            user: snapshot.state.user().cloned(),
            is_authenticated: snapshot.state.is_authenticated(),
            is_loading: snapshot.state.is_loading(),
            profile_stage: match &snapshot.state {
                AuthState::Authenticated(auth) => Some(auth.stage),
                AuthState::Loading | AuthState::Unauthenticated => None,
            },
        }
    }
}

/// `POST /api/auth/login`: verify credentials, bind a new store to a cookie.
pub async fn login(State(state): State<AppState>, jar: CookieJar, Json(body): Json<LoginBody>) -> Response {
    let store = state.sessions.new_store();
    if let Err(e) = store.login(&body.email, &body.password).await {
        let status = match &e {
            SessionError::Backend(inner) if inner.is_rejection() => StatusCode::UNAUTHORIZED,
            other => session_error_to_status(other),
        };
        return error_response(status, &e.to_string());
    }

    let Some(token) = store.access_token() else {
        return error_response(StatusCode::CONFLICT, "session changed during login; try again");
    };

    // A browser switching accounts leaves its old store behind.
    if let Some(previous) = jar.get(COOKIE_NAME).map(Cookie::value) {
        state.sessions.remove(previous).await;
    }
    state.sessions.insert(&token, Arc::clone(&store)).await;

    let jar = jar.add(session_cookie(token, state.settings.cookie_secure));
    (jar, Json(MeResponse::from(&store.snapshot()))).into_response()
}

/// `POST /api/auth/logout`: clear local state, revoke remotely, drop cookie.
///
/// Reads the cookie directly: a cookie with no live store is revoked as is,
/// without starting a session check first.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let token = jar.get(COOKIE_NAME).map(Cookie::value).filter(|v| !v.is_empty());
    state.sessions.logout(token).await;
    let jar = CookieJar::new().add(cleared_session_cookie(state.settings.cookie_secure));
    (jar, StatusCode::NO_CONTENT)
}

/// `POST /api/auth/register`: create an account; the caller's session is untouched.
pub async fn register(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(body): Json<RegisterRequest>,
) -> Response {
    let result = match &session.store {
        Some(store) => store.register(&body).await,
        None => session::register(state.sessions.deps(), None, &body).await,
    };
    match result {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => {
            warn!(error = %e, "registration rejected");
            error_response(session_error_to_status(&e), &e.to_string())
        }
    }
}

/// `POST /api/auth/clear-cache`: recovery for a corrupted session cookie.
pub async fn clear_cache(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let token = jar.get(COOKIE_NAME).map(Cookie::value).filter(|v| !v.is_empty());
    state.sessions.clear_auth_cache(token).await;
    info!("session cookie cleared on request");
    let jar = CookieJar::new().add(cleared_session_cookie(state.settings.cookie_secure));
    (jar, StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct RecoverBody {
    pub email: String,
}

/// `POST /api/auth/recover`: send a password-reset email.
///
/// Answers 204 for unknown addresses too, so the endpoint does not reveal
/// which accounts exist.
pub async fn recover(State(state): State<AppState>, Json(body): Json<RecoverBody>) -> Response {
    match state.backend().recover(body.email.trim()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) if e.is_rejection() => {
            info!(error = %e, "password recovery rejected by auth service");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            warn!(error = %e, "password recovery failed");
            error_response(backend_error_to_status(&e), &e.to_string())
        }
    }
}

/// `GET /api/auth/me`: current auth snapshot.
pub async fn me(State(state): State<AppState>, session: CurrentSession) -> Response {
    let body = Json(MeResponse::from(&session.snapshot)).into_response();
    forget_stale_cookie(&session, state.settings.cookie_secure, body)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
