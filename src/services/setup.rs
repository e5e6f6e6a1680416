//! First-run admin provisioning through the external setup endpoint.

use std::time::Duration;

use serde::Deserialize;
use tracing::info;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("admin setup request failed: {0}")]
    Request(String),
    #[error("{0}")]
    Rejected(String),
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    message: Option<String>,
}

pub struct AdminSetupClient {
    http: reqwest::Client,
    url: String,
    admin_email: String,
}

impl AdminSetupClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(url: String, admin_email: String) -> Result<Self, SetupError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SetupError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, url, admin_email })
    }

    #[must_use]
    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    /// Provision the configured admin identity with `password`.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` with the endpoint's `message` on a non-2xx answer,
    /// or `Request` when the endpoint cannot be reached.
    pub async fn create_admin(&self, password: &str) -> Result<(), SetupError> {
        if password.is_empty() {
            return Err(SetupError::EmptyPassword);
        }
        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "email": self.admin_email, "password": password }))
            .send()
            .await
            .map_err(|e| SetupError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!(email = %self.admin_email, "admin account provisioned");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SetupError::Rejected(rejection_message(status.as_u16(), &body)))
    }
}

fn rejection_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .unwrap_or_default()
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("admin setup failed with status {status}"))
}

#[cfg(test)]
#[path = "setup_test.rs"]
mod tests;
