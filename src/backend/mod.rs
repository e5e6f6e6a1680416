//! Auth service adapter.
//!
//! DESIGN
//! ======
//! Credential checks, token issuance and refresh all happen in the external
//! auth service. `AuthBackend` is the seam the session store talks through;
//! `gotrue::GoTrueClient` is the HTTP implementation and tests swap in a
//! mock.

pub mod gotrue;

use crate::model::{AuthIdentity, BackendSession, UserMetadata};

pub use gotrue::GoTrueClient;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("auth request failed: {0}")]
    Request(String),
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("auth response parse failed: {0}")]
    Parse(String),
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl BackendError {
    /// `true` when the service looked at the request and said no
    /// (bad credentials, duplicate signup, expired token).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { status, .. } if (400..500).contains(status))
    }
}

/// Operations consumed from the auth service. Enables mocking in tests.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// Verify credentials and issue a session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<BackendSession, BackendError>;

    /// Create an identity. Returns it whether or not the service also opened a session.
    async fn sign_up(&self, email: &str, password: &str, metadata: &UserMetadata) -> Result<AuthIdentity, BackendError>;

    /// Revoke the session behind `access_token`.
    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;

    /// Look up the identity behind `access_token`. `Ok(None)` when the token
    /// is no longer valid.
    async fn get_session(&self, access_token: &str) -> Result<Option<BackendSession>, BackendError>;

    /// Trade a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<BackendSession, BackendError>;

    /// Send a password-recovery email.
    async fn recover(&self, email: &str) -> Result<(), BackendError>;
}
