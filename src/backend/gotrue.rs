//! GoTrue-style auth REST client (`/auth/v1/...`).
//!
//! Thin HTTP wrapper. Response parsing lives in free functions so it can be
//! tested without a server.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use super::{AuthBackend, BackendError};
use crate::model::{AuthIdentity, BackendSession, UserMetadata};

const CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// CLIENT
// =============================================================================

pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoTrueClient {
    /// Build a client for the service at `base_url` (no trailing `/auth/v1`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(base_url: &str, api_key: String, request_timeout_secs: u64) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned(), api_key })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(StatusCode, String), BackendError> {
        let response = request
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok((status, text))
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<BackendSession, BackendError> {
        let request = self
            .http
            .post(self.url("token"))
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let (status, text) = self.send(request).await?;
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &text));
        }
        parse_session(&text)
    }
}

#[async_trait::async_trait]
impl AuthBackend for GoTrueClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<BackendSession, BackendError> {
        self.token_grant("password", serde_json::json!({ "email": email, "password": password }))
            .await
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: &UserMetadata) -> Result<AuthIdentity, BackendError> {
        let request = self.http.post(self.url("signup")).json(&serde_json::json!({
            "email": email,
            "password": password,
            "data": metadata,
        }));
        let (status, text) = self.send(request).await?;
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &text));
        }
        parse_signup(&text)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let request = self.http.post(self.url("logout")).bearer_auth(access_token);
        let (status, text) = self.send(request).await?;
        // Already-revoked tokens count as signed out.
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        Err(rejection(status.as_u16(), &text))
    }

    async fn get_session(&self, access_token: &str) -> Result<Option<BackendSession>, BackendError> {
        let request = self.http.get(self.url("user")).bearer_auth(access_token);
        let (status, text) = self.send(request).await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &text));
        }
        let identity = parse_identity(&text)?;
        Ok(Some(BackendSession {
            access_token: access_token.to_owned(),
            refresh_token: None,
            expires_in: None,
            identity,
        }))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<BackendSession, BackendError> {
        self.token_grant("refresh_token", serde_json::json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn recover(&self, email: &str) -> Result<(), BackendError> {
        let request = self
            .http
            .post(self.url("recover"))
            .json(&serde_json::json!({ "email": email }));
        let (status, text) = self.send(request).await?;
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &text));
        }
        Ok(())
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct SessionResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    user: AuthIdentity,
}

/// Signup answers with either a bare user or a session wrapping one.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignupResponse {
    Session { user: AuthIdentity },
    User(AuthIdentity),
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_session(json: &str) -> Result<BackendSession, BackendError> {
    let resp: SessionResponse = serde_json::from_str(json).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok(BackendSession {
        access_token: resp.access_token,
        refresh_token: resp.refresh_token,
        expires_in: resp.expires_in,
        identity: resp.user,
    })
}

fn parse_signup(json: &str) -> Result<AuthIdentity, BackendError> {
    let resp: SignupResponse = serde_json::from_str(json).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok(match resp {
        SignupResponse::Session { user } | SignupResponse::User(user) => user,
    })
}

fn parse_identity(json: &str) -> Result<AuthIdentity, BackendError> {
    serde_json::from_str(json).map_err(|e| BackendError::Parse(e.to_string()))
}

/// Build a `Rejected` error from the first message field the service sent.
fn rejection(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("auth service returned status {status}"));
    BackendError::Rejected { status, message }
}

#[cfg(test)]
#[path = "gotrue_test.rs"]
mod tests;
