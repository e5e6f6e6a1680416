//! Server configuration parsed from environment variables.

use crate::gate::UnknownRolePolicy;
use crate::model::{DEFAULT_ADMIN_EMAIL, DEFAULT_EMAIL_DOMAIN, IdentityPolicy};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_AUTH_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SESSION_SWEEP_SECS: u64 = 300;
pub const DEFAULT_WEB_DIR: &str = "web";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub auth_url: String,
    pub auth_anon_key: String,
    pub auth_request_timeout_secs: u64,
    pub identity: IdentityPolicy,
    /// Admin bootstrap endpoint. First-run setup is disabled when absent.
    pub admin_setup_url: Option<String>,
    pub unknown_role_policy: UnknownRolePolicy,
    pub cookie_secure: bool,
    pub web_dir: String,
    pub session_sweep_secs: u64,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`
    /// - `AUTH_URL`: base URL of the auth service
    /// - `AUTH_ANON_KEY`: API key sent with every auth request
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `AUTH_REQUEST_TIMEOUT_SECS`: default 30
    /// - `ADMIN_EMAIL`: identity always treated as admin
    /// - `INSTITUTION_EMAIL_DOMAIN`: registration suffix, default `@institution.edu`
    /// - `ADMIN_SETUP_URL`: admin bootstrap endpoint
    /// - `UNKNOWN_ROLE_ROUTE`: `deny` (default) or `researcher`
    /// - `COOKIE_SECURE`: defaults to true when `AUTH_URL` is https
    /// - `WEB_DIR`: static pages, default `web`
    /// - `SESSION_SWEEP_SECS`: default 300
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let auth_url = required("AUTH_URL")?.trim_end_matches('/').to_owned();
        let auth_anon_key = required("AUTH_ANON_KEY")?;

        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var: "PORT", value: raw })?,
            Err(_) => DEFAULT_PORT,
        };

        let identity = IdentityPolicy {
            admin_email: std::env::var("ADMIN_EMAIL")
                .map(|v| v.trim().to_ascii_lowercase())
                .unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_owned()),
            email_domain: normalize_domain(
                &std::env::var("INSTITUTION_EMAIL_DOMAIN").unwrap_or_else(|_| DEFAULT_EMAIL_DOMAIN.to_owned()),
            ),
        };

        let unknown_role_policy = parse_unknown_role_policy(std::env::var("UNKNOWN_ROLE_ROUTE").ok().as_deref())?;
        let cookie_secure = env_bool("COOKIE_SECURE").unwrap_or_else(|| auth_url.starts_with("https://"));

        Ok(Self {
            database_url,
            port,
            auth_url,
            auth_anon_key,
            auth_request_timeout_secs: env_parse("AUTH_REQUEST_TIMEOUT_SECS", DEFAULT_AUTH_REQUEST_TIMEOUT_SECS),
            identity,
            admin_setup_url: std::env::var("ADMIN_SETUP_URL").ok().filter(|v| !v.trim().is_empty()),
            unknown_role_policy,
            cookie_secure,
            web_dir: std::env::var("WEB_DIR").unwrap_or_else(|_| DEFAULT_WEB_DIR.to_owned()),
            session_sweep_secs: env_parse("SESSION_SWEEP_SECS", DEFAULT_SESSION_SWEEP_SECS),
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.starts_with('@') { trimmed } else { format!("@{trimmed}") }
}

fn parse_unknown_role_policy(raw: Option<&str>) -> Result<UnknownRolePolicy, ConfigError> {
    match raw.map(str::trim).unwrap_or("deny") {
        "deny" => Ok(UnknownRolePolicy::Deny),
        "researcher" => Ok(UnknownRolePolicy::Researcher),
        other => Err(ConfigError::Invalid { var: "UNKNOWN_ROLE_ROUTE", value: other.to_owned() }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
