//! Session store: per-browser authentication state machine.
//!
//! DESIGN
//! ======
//! Each browser session owns one `SessionStore`. Its state is an explicit
//! variant (`Loading | Unauthenticated | Authenticated`) published through a
//! `watch` channel, so handlers read a consistent snapshot and tests can
//! await transitions.
//!
//! An authenticated user appears in two stages: a basic user built
//! synchronously from session metadata, then an enriched user built from the
//! `profiles` row once the fetch resolves. Consumers must tolerate the role
//! changing between the two.
//!
//! CONCURRENCY
//! ===========
//! Writers (login, logout, restore, auth events) reserve a monotonic
//! sequence number before their first await and commit only if nothing newer
//! has landed. Refinements (profile enrichment, token refresh for the same
//! identity) apply only while the sequence they started under is still
//! current, and do not advance it. A slow profile fetch therefore can never
//! resurrect a user after logout or overwrite a different identity.
//!
//! ERROR HANDLING
//! ==============
//! Profile fetch failures are logged and leave the basic user in place.
//! Remote sign-out failures are logged; the local state is already cleared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{AuthBackend, BackendError};
use crate::model::{BackendSession, IdentityPolicy, Profile, ProfileStage, Role, User, UserMetadata};
use crate::services::profile::ProfileStore;

const REFRESH_MARGIN_SECS: u64 = 60;
const MIN_REFRESH_DELAY_SECS: u64 = 5;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("email must end with {domain}")]
    EmailDomain { domain: String },
    #[error("only an administrator can register a {} account", .0.as_str())]
    RoleRequiresAdmin(Role),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Collaborators every store needs. Cloned into each new store.
#[derive(Clone)]
pub struct SessionDeps {
    pub backend: Arc<dyn AuthBackend>,
    pub profiles: Arc<dyn ProfileStore>,
    pub identity: Arc<IdentityPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub user: User,
    pub stage: ProfileStage,
    pub session: BackendSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Initial session check still in flight.
    Loading,
    Unauthenticated,
    Authenticated(Authenticated),
}

impl AuthState {
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(auth) => Some(&auth.user),
            Self::Loading | Self::Unauthenticated => None,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// State tagged with the sequence number of the write that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub seq: u64,
    pub state: AuthState,
}

impl AuthSnapshot {
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self { seq: 0, state: AuthState::Unauthenticated }
    }
}

/// Auth-state-change notifications delivered to a store's event pump.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(BackendSession),
    TokenRefreshed(BackendSession),
    /// The user's profile row changed; re-run enrichment.
    UserUpdated(Uuid),
    SignedOut,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_register_role")]
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
}

fn default_register_role() -> Role {
    Role::Researcher
}

// =============================================================================
// SESSION STORE
// =============================================================================

pub struct SessionStore {
    deps: SessionDeps,
    seq: AtomicU64,
    state: watch::Sender<AuthSnapshot>,
    events: mpsc::UnboundedSender<AuthEvent>,
}

impl SessionStore {
    /// Create a store in `initial` state and start its event pump.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(deps: SessionDeps, initial: AuthState) -> Arc<Self> {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(AuthSnapshot { seq: 0, state: initial });
        let store = Arc::new(Self { deps, seq: AtomicU64::new(0), state, events });
        spawn_event_pump(Arc::downgrade(&store), events_rx);
        store
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().state.user().cloned()
    }

    /// Access token of the current session, if authenticated.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        match &self.state.borrow().state {
            AuthState::Authenticated(auth) => Some(auth.session.access_token.clone()),
            AuthState::Loading | AuthState::Unauthenticated => None,
        }
    }

    /// Queue an auth-state-change event for the pump.
    pub fn notify(&self, event: AuthEvent) {
        if self.events.send(event).is_err() {
            debug!("auth event dropped; pump stopped");
        }
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Verify credentials and install the basic user without waiting for the
    /// profile. Enrichment runs in the background.
    ///
    /// # Errors
    ///
    /// Returns the auth service's error (bad credentials, network failure).
    pub async fn login(self: &Arc<Self>, email: &str, password: &str) -> Result<User, SessionError> {
        let seq = self.next_seq();
        let session = match self.deps.backend.sign_in_with_password(email.trim(), password).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "login failed");
                return Err(e.into());
            }
        };
        let user = self.deps.identity.basic_user(&session.identity);
        if !self.install(seq, session) {
            debug!(user_id = %user.id, "login superseded by a newer auth state");
        }
        Ok(user)
    }

    /// Clear local state first, then revoke the remote session best-effort.
    ///
    /// Returns whether a remote sign-out was attempted. It is not when the
    /// store held no authenticated session, and the caller then owns
    /// revoking whatever token it has.
    pub async fn logout(&self) -> bool {
        let seq = self.next_seq();
        let Some(AuthState::Authenticated(previous)) = self.commit(seq, AuthState::Unauthenticated) else {
            return false;
        };
        info!(user_id = %previous.user.id, "signed out");
        if let Err(e) = self.deps.backend.sign_out(&previous.session.access_token).await {
            warn!(user_id = %previous.user.id, error = %e, "remote sign-out failed");
        }
        true
    }

    /// Recovery path for a corrupted cached session: sign out regardless of
    /// what state the store believes it is in. Same return as [`Self::logout`].
    pub async fn clear_auth_cache(&self) -> bool {
        let revoked = self.logout().await;
        info!("auth cache cleared");
        revoked
    }

    /// Register a new account on behalf of this store's current user.
    ///
    /// # Errors
    ///
    /// See [`register`].
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, SessionError> {
        let current = self.current_user();
        register(&self.deps, current.as_ref(), request).await
    }

    /// Initial session check for a cookie the server has no live store for.
    pub async fn restore(self: &Arc<Self>, access_token: &str) {
        let seq = self.next_seq();
        self.restore_reserved(seq, access_token).await;
    }

    /// Reserve the sequence for a restore that will run later, so that any
    /// write made in between (a logout) wins over it.
    #[must_use]
    pub fn reserve_restore(&self) -> u64 {
        self.next_seq()
    }

    /// `restore` under a sequence taken from [`Self::reserve_restore`].
    pub async fn restore_reserved(self: &Arc<Self>, seq: u64, access_token: &str) {
        match self.deps.backend.get_session(access_token).await {
            Ok(Some(session)) => {
                self.install(seq, session);
            }
            Ok(None) => {
                debug!("no live session behind cookie");
                self.commit(seq, AuthState::Unauthenticated);
            }
            Err(e) => {
                warn!(error = %e, "session check failed; treating as signed out");
                self.commit(seq, AuthState::Unauthenticated);
            }
        }
    }

    /// Apply one auth-state-change event.
    pub async fn handle_event(self: &Arc<Self>, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) => self.accept_session(session),
            AuthEvent::TokenRefreshed(session) => {
                let seq = self.state.borrow().seq;
                self.apply_refresh(seq, session).await;
            }
            AuthEvent::UserUpdated(user_id) => {
                let seq = self.state.borrow().seq;
                if self.current_user().is_some_and(|u| u.id == user_id) {
                    self.enrich(seq, user_id).await;
                }
            }
            AuthEvent::SignedOut => {
                let seq = self.next_seq();
                if self.commit(seq, AuthState::Unauthenticated).is_some() {
                    info!("session ended by auth service");
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // State transitions
    // -------------------------------------------------------------------------

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Replace the state if `seq` is newer than the committed one. Returns the
    /// replaced state when the write landed.
    fn commit(&self, seq: u64, state: AuthState) -> Option<AuthState> {
        let mut previous = None;
        self.state.send_if_modified(|snap| {
            if seq <= snap.seq {
                return false;
            }
            previous = Some(std::mem::replace(&mut snap.state, state));
            snap.seq = seq;
            true
        });
        if previous.is_none() {
            debug!(seq, "discarding stale auth state write");
        }
        previous
    }

    /// Modify the authenticated state in place, only while `seq` is still the
    /// committed sequence and the identity is `user_id`.
    fn refine(&self, seq: u64, user_id: Uuid, apply: impl FnOnce(&mut Authenticated)) -> bool {
        self.state.send_if_modified(|snap| {
            if snap.seq != seq {
                return false;
            }
            match &mut snap.state {
                AuthState::Authenticated(auth) if auth.user.id == user_id => {
                    apply(auth);
                    true
                }
                _ => false,
            }
        })
    }

    /// Commit a basic user for `session`, then start enrichment and refresh.
    fn install(self: &Arc<Self>, seq: u64, session: BackendSession) -> bool {
        let user = self.deps.identity.basic_user(&session.identity);
        let user_id = user.id;
        let role = user.role;
        let refresh = refresh_plan(&session);
        let state = AuthState::Authenticated(Authenticated { user, stage: ProfileStage::Basic, session });
        if self.commit(seq, state).is_none() {
            return false;
        }
        info!(%user_id, role = role.map_or("unrecognized", Role::as_str), "session established");
        self.spawn_enrichment(seq, user_id);
        if let Some((delay, refresh_token)) = refresh {
            self.schedule_refresh(delay, refresh_token);
        }
        true
    }

    fn accept_session(self: &Arc<Self>, session: BackendSession) {
        let user_id = session.identity.id;
        let refresh = refresh_plan(&session);
        let mut pending = Some(session);
        let refreshed = self.state.send_if_modified(|snap| match &mut snap.state {
            AuthState::Authenticated(auth) if auth.user.id == user_id => match pending.take() {
                Some(session) => {
                    auth.session = session;
                    true
                }
                None => false,
            },
            _ => false,
        });

        if refreshed {
            debug!(%user_id, "session tokens refreshed");
            if let Some((delay, refresh_token)) = refresh {
                self.schedule_refresh(delay, refresh_token);
            }
        } else if let Some(session) = pending {
            let seq = self.next_seq();
            self.install(seq, session);
        }
    }

    fn spawn_enrichment(self: &Arc<Self>, seq: u64, user_id: Uuid) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            store.enrich(seq, user_id).await;
        });
    }

    /// Replace the basic user with one built from the profile row.
    async fn enrich(&self, seq: u64, user_id: Uuid) -> bool {
        let profile = match self.deps.profiles.fetch_profile(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!(%user_id, "no profile row; keeping basic user");
                return false;
            }
            Err(e) => {
                warn!(%user_id, error = %e, "profile fetch failed; keeping basic user");
                return false;
            }
        };

        let identity = &self.deps.identity;
        let applied = self.refine(seq, user_id, |auth| {
            let basic = identity.basic_user(&auth.session.identity);
            auth.user = identity.enriched_user(&basic, &profile);
            auth.stage = ProfileStage::Enriched;
        });
        if applied {
            debug!(%user_id, "profile enrichment applied");
        } else {
            debug!(%user_id, "discarding stale profile enrichment");
        }
        applied
    }

    /// Swap in refreshed tokens while `seq` is current and the session
    /// belongs to the same identity. Never installs a user. Tokens that
    /// arrive too late are revoked.
    async fn apply_refresh(self: &Arc<Self>, seq: u64, session: BackendSession) {
        let user_id = session.identity.id;
        let refresh = refresh_plan(&session);
        let mut pending = Some(session);
        let applied = self.refine(seq, user_id, |auth| {
            if let Some(session) = pending.take() {
                auth.session = session;
            }
        });

        if applied {
            debug!(%user_id, "session tokens refreshed");
            if let Some((delay, refresh_token)) = refresh {
                self.schedule_refresh(delay, refresh_token);
            }
        } else if let Some(stale) = pending {
            debug!(%user_id, "discarding refreshed session for a superseded state");
            if let Err(e) = self.deps.backend.sign_out(&stale.access_token).await {
                debug!(%user_id, error = %e, "revoking discarded session failed");
            }
        }
    }

    /// Sequence and identity of the authenticated state, if it still holds
    /// `refresh_token`.
    fn refresh_target(&self, refresh_token: &str) -> Option<(u64, Uuid)> {
        let snap = self.state.borrow();
        match &snap.state {
            AuthState::Authenticated(auth) if auth.session.refresh_token.as_deref() == Some(refresh_token) => {
                Some((snap.seq, auth.user.id))
            }
            _ => None,
        }
    }

    /// Refresh the session shortly before it expires. The outcome lands only
    /// if the state it started under is still current.
    fn schedule_refresh(self: &Arc<Self>, delay: Duration, refresh_token: String) {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(store) = store.upgrade() else {
                return;
            };
            let Some((seq, user_id)) = store.refresh_target(&refresh_token) else {
                return;
            };
            match store.deps.backend.refresh_session(&refresh_token).await {
                Ok(session) => store.apply_refresh(seq, session).await,
                Err(e) => {
                    warn!(%user_id, error = %e, "token refresh failed; ending session");
                    store.end_if_current(seq);
                }
            }
        });
    }

    /// Commit `Unauthenticated` only if nothing has been written since `seq`.
    fn end_if_current(&self, seq: u64) {
        let next = self.next_seq();
        let ended = self.state.send_if_modified(|snap| {
            if snap.seq != seq {
                return false;
            }
            snap.state = AuthState::Unauthenticated;
            snap.seq = next;
            true
        });
        if !ended {
            debug!(seq, "session changed during refresh; keeping it");
        }
    }
}

fn refresh_plan(session: &BackendSession) -> Option<(Duration, String)> {
    let refresh_token = session.refresh_token.clone()?;
    let expires_in = session.expires_in?;
    Some((refresh_delay(expires_in), refresh_token))
}

fn refresh_delay(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in.saturating_sub(REFRESH_MARGIN_SECS).max(MIN_REFRESH_DELAY_SECS))
}

/// Drain auth events into the store until it is dropped.
fn spawn_event_pump(store: Weak<SessionStore>, mut events: mpsc::UnboundedReceiver<AuthEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(store) = store.upgrade() else {
                break;
            };
            store.handle_event(event).await;
        }
    });
}

// =============================================================================
// REGISTRATION
// =============================================================================

/// Create an account. Both checks run before any network call:
/// non-researcher roles need an authenticated admin as `current`, and the
/// email must carry the institutional domain.
///
/// These checks are advisory; the auth service's own policy is what actually
/// protects role assignment.
///
/// # Errors
///
/// Returns `RoleRequiresAdmin`, `EmailDomain`, or the auth service's error.
pub async fn register(
    deps: &SessionDeps,
    current: Option<&User>,
    request: &RegisterRequest,
) -> Result<User, SessionError> {
    if request.role != Role::Researcher && current.and_then(|u| u.role) != Some(Role::Admin) {
        return Err(SessionError::RoleRequiresAdmin(request.role));
    }
    if !deps.identity.email_allowed(&request.email) {
        return Err(SessionError::EmailDomain { domain: deps.identity.email_domain.clone() });
    }

    let email = request.email.trim().to_ascii_lowercase();
    let metadata = UserMetadata {
        name: Some(request.name.trim().to_owned()),
        role: Some(request.role.as_str().to_owned()),
        department: request.department.clone(),
        avatar_url: None,
    };
    let identity = deps.backend.sign_up(&email, &request.password, &metadata).await?;
    let user = deps.identity.basic_user(&identity);

    let profile = Profile {
        id: identity.id,
        name: user.name.clone(),
        email: user.email.clone(),
        role: request.role.as_str().to_owned(),
        department: request.department.clone(),
        profile_image: None,
    };
    if let Err(e) = deps.profiles.upsert_profile(&profile).await {
        warn!(user_id = %identity.id, error = %e, "profile row not written for new account");
    }

    info!(user_id = %identity.id, role = request.role.as_str(), "account registered");
    Ok(user)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
