//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the auth-service client, the profile store, the live session
//! registry, and parsed configuration. Session stores are reached only
//! through the registry, never through globals.

use std::sync::Arc;

use crate::backend::AuthBackend;
use crate::config::AppConfig;
use crate::gate::UnknownRolePolicy;
use crate::services::profile::ProfileStore;
use crate::services::registry::SessionRegistry;
use crate::services::session::SessionDeps;
use crate::services::setup::AdminSetupClient;

/// Settings route handlers read on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSettings {
    pub unknown_role_policy: UnknownRolePolicy,
    pub cookie_secure: bool,
}

impl From<&AppConfig> for RouteSettings {
    fn from(config: &AppConfig) -> Self {
        Self { unknown_role_policy: config.unknown_role_policy, cookie_secure: config.cookie_secure }
    }
}

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub deps: SessionDeps,
    pub sessions: SessionRegistry,
    /// `None` when `ADMIN_SETUP_URL` is not configured.
    pub setup: Option<Arc<AdminSetupClient>>,
    pub settings: Arc<RouteSettings>,
}

impl AppState {
    #[must_use]
    pub fn new(deps: SessionDeps, setup: Option<AdminSetupClient>, settings: RouteSettings) -> Self {
        Self {
            sessions: SessionRegistry::new(deps.clone()),
            deps,
            setup: setup.map(Arc::new),
            settings: Arc::new(settings),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn AuthBackend> {
        &self.deps.backend
    }

    #[must_use]
    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.deps.profiles
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode, header};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::backend::BackendError;
    use crate::model::{AuthIdentity, BackendSession, IdentityPolicy, Profile, UserMetadata};
    use crate::services::profile::{ProfileError, ProfileUpdate};

    // -------------------------------------------------------------------------
    // MockBackend
    // -------------------------------------------------------------------------

    /// In-memory auth service. Access tokens are `access-<id>`.
    #[derive(Default)]
    pub struct MockBackend {
        accounts: Mutex<HashMap<String, (String, AuthIdentity)>>,
        /// Every trait call increments this, including rejected ones.
        pub calls: AtomicUsize,
        pub signed_out: Mutex<Vec<String>>,
        pub fail_sign_out: AtomicBool,
        /// Sessions issued by sign-in carry this expiry when set.
        pub expires_in: Mutex<Option<u64>>,
        pub fail_refresh: AtomicBool,
        /// Artificial latency for `refresh_session`.
        pub refresh_delay: Mutex<Option<Duration>>,
    }

    impl MockBackend {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Register an account; `role` lands in user metadata.
        pub fn add_account(&self, email: &str, password: &str, role: Option<&str>) -> AuthIdentity {
            let identity = AuthIdentity {
                id: Uuid::new_v4(),
                email: email.to_owned(),
                user_metadata: UserMetadata {
                    name: Some(email.split('@').next().unwrap_or("user").to_owned()),
                    role: role.map(str::to_owned),
                    department: None,
                    avatar_url: None,
                },
            };
            self.accounts
                .lock()
                .unwrap()
                .insert(email.to_owned(), (password.to_owned(), identity.clone()));
            identity
        }

        #[must_use]
        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn session_for(&self, identity: AuthIdentity) -> BackendSession {
            BackendSession {
                access_token: format!("access-{}", identity.id),
                refresh_token: Some(format!("refresh-{}", identity.id)),
                expires_in: *self.expires_in.lock().unwrap(),
                identity,
            }
        }

        fn find_by_id(&self, id: &str) -> Option<AuthIdentity> {
            self.accounts
                .lock()
                .unwrap()
                .values()
                .find(|(_, identity)| identity.id.to_string() == id)
                .map(|(_, identity)| identity.clone())
        }
    }

    #[async_trait::async_trait]
    impl AuthBackend for MockBackend {
        async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<BackendSession, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let account = self.accounts.lock().unwrap().get(email).cloned();
            match account {
                Some((expected, identity)) if expected == password => Ok(self.session_for(identity)),
                _ => Err(BackendError::Rejected { status: 400, message: "Invalid login credentials".into() }),
            }
        }

        async fn sign_up(&self, email: &str, password: &str, metadata: &UserMetadata) -> Result<AuthIdentity, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(email) {
                return Err(BackendError::Rejected { status: 422, message: "User already registered".into() });
            }
            let identity =
                AuthIdentity { id: Uuid::new_v4(), email: email.to_owned(), user_metadata: metadata.clone() };
            accounts.insert(email.to_owned(), (password.to_owned(), identity.clone()));
            Ok(identity)
        }

        async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_sign_out.load(Ordering::SeqCst) {
                return Err(BackendError::Request("connection reset".into()));
            }
            self.signed_out.lock().unwrap().push(access_token.to_owned());
            Ok(())
        }

        async fn get_session(&self, access_token: &str) -> Result<Option<BackendSession>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if access_token == "broken" {
                return Err(BackendError::Request("connection refused".into()));
            }
            let Some(id) = access_token.strip_prefix("access-") else {
                return Ok(None);
            };
            Ok(self.find_by_id(id).map(|identity| BackendSession {
                access_token: access_token.to_owned(),
                refresh_token: None,
                expires_in: None,
                identity,
            }))
        }

        async fn refresh_session(&self, refresh_token: &str) -> Result<BackendSession, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.refresh_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_refresh.load(Ordering::SeqCst) {
                return Err(BackendError::Rejected { status: 400, message: "Invalid Refresh Token".into() });
            }
            let id = refresh_token.strip_prefix("refresh-").unwrap_or_default();
            let identity = self
                .find_by_id(id)
                .ok_or_else(|| BackendError::Rejected { status: 400, message: "Invalid Refresh Token".into() })?;
            let mut session = self.session_for(identity);
            session.access_token = format!("{}-refreshed", session.access_token);
            session.expires_in = None;
            Ok(session)
        }

        async fn recover(&self, _email: &str) -> Result<(), BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    // -------------------------------------------------------------------------
    // MemoryProfileStore
    // -------------------------------------------------------------------------

    #[derive(Default)]
    pub struct MemoryProfileStore {
        rows: Mutex<HashMap<Uuid, Profile>>,
        /// Artificial latency for `fetch_profile`.
        pub delay: Mutex<Option<Duration>>,
        pub fail: AtomicBool,
    }

    impl MemoryProfileStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, profile: Profile) {
            self.rows.lock().unwrap().insert(profile.id, profile);
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = Some(delay);
        }

        #[must_use]
        pub fn get(&self, id: Uuid) -> Option<Profile> {
            self.rows.lock().unwrap().get(&id).cloned()
        }
    }

    #[async_trait::async_trait]
    impl ProfileStore for MemoryProfileStore {
        async fn fetch_profile(&self, id: Uuid) -> Result<Option<Profile>, ProfileError> {
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProfileError::Db(sqlx::Error::PoolTimedOut));
            }
            Ok(self.get(id))
        }

        async fn upsert_profile(&self, profile: &Profile) -> Result<(), ProfileError> {
            self.insert(profile.clone());
            Ok(())
        }

        async fn list_profiles(&self) -> Result<Vec<Profile>, ProfileError> {
            let mut rows: Vec<Profile> = self.rows.lock().unwrap().values().cloned().collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(rows)
        }

        async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<Profile, ProfileError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&id).ok_or(ProfileError::NotFound(id))?;
            if let Some(name) = &update.name {
                row.name.clone_from(name);
            }
            if let Some(role) = &update.role {
                row.role.clone_from(role);
            }
            if let Some(department) = &update.department {
                row.department = Some(department.clone());
            }
            Ok(row.clone())
        }
    }

    // -------------------------------------------------------------------------
    // Builders
    // -------------------------------------------------------------------------

    /// Test fixture: mock collaborators plus the `SessionDeps` wrapping them.
    pub struct Harness {
        pub backend: Arc<MockBackend>,
        pub profiles: Arc<MemoryProfileStore>,
        pub deps: SessionDeps,
    }

    #[must_use]
    pub fn harness() -> Harness {
        let backend = Arc::new(MockBackend::new());
        let profiles = Arc::new(MemoryProfileStore::new());
        let deps = SessionDeps {
            backend: backend.clone(),
            profiles: profiles.clone(),
            identity: Arc::new(IdentityPolicy::default()),
        };
        Harness { backend, profiles, deps }
    }

    /// Profile row matching `identity` with a stored `role`.
    #[must_use]
    pub fn profile_for(identity: &AuthIdentity, role: &str) -> Profile {
        Profile {
            id: identity.id,
            name: format!("{} (profile)", identity.user_metadata.name.clone().unwrap_or_default()),
            email: identity.email.clone(),
            role: role.to_owned(),
            department: Some("Research Office".into()),
            profile_image: None,
        }
    }

    #[must_use]
    pub fn test_settings() -> RouteSettings {
        RouteSettings { unknown_role_policy: UnknownRolePolicy::Deny, cookie_secure: false }
    }

    // -------------------------------------------------------------------------
    // HTTP
    // -------------------------------------------------------------------------

    /// Router over `state` with no page directory behind it.
    #[must_use]
    pub fn test_router(state: AppState) -> axum::Router {
        crate::routes::app(state, std::path::Path::new("web-missing"))
    }

    #[must_use]
    pub fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = cookie {
            builder = builder.header(header::COOKIE, format!("{}={token}", crate::routes::auth::COOKIE_NAME));
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    /// Drive one request through `app`; empty or non-JSON bodies read as `Null`.
    pub async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, HeaderMap, serde_json::Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, headers, json)
    }

    /// Session cookie value from a `Set-Cookie` response header.
    #[must_use]
    pub fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
        let prefix = format!("{}=", crate::routes::auth::COOKIE_NAME);
        headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| v.strip_prefix(prefix.as_str()))
            .map(|rest| rest.split(';').next().unwrap_or_default().to_owned())
    }

    /// `AppState` over the harness mocks, with setup disabled.
    #[must_use]
    pub fn test_app_state(harness: &Harness) -> AppState {
        AppState::new(harness.deps.clone(), None, test_settings())
    }
}
