//! Live session registry: session cookie to `SessionStore`.
//!
//! DESIGN
//! ======
//! Keys are SHA-256 digests of the cookie value, so raw tokens never sit in
//! map keys or logs. A cookie the registry has not seen (server restart,
//! another replica) gets a fresh store in `Loading` while the initial session
//! check runs in the background. Once that store has settled on
//! `Unauthenticated`, the first request to read it evicts it and clears the
//! cookie, so junk cookies do not linger until the sweeper runs.
//!
//! TRADE-OFFS
//! ==========
//! The cookie holds the access token issued at login. Refreshed tokens stay
//! inside the store, so after a restart a long-lived cookie may fail the
//! session check and land on the login page.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::session::{AuthEvent, AuthState, SessionDeps, SessionStore};

#[must_use]
pub fn session_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Clone)]
pub struct SessionRegistry {
    deps: SessionDeps,
    stores: Arc<RwLock<HashMap<String, Arc<SessionStore>>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(deps: SessionDeps) -> Self {
        Self { deps, stores: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Fresh store not yet bound to a cookie (used for login).
    #[must_use]
    pub fn new_store(&self) -> Arc<SessionStore> {
        SessionStore::spawn(self.deps.clone(), AuthState::Unauthenticated)
    }

    #[must_use]
    pub fn deps(&self) -> &SessionDeps {
        &self.deps
    }

    pub async fn get(&self, token: &str) -> Option<Arc<SessionStore>> {
        self.stores.read().await.get(&session_key(token)).cloned()
    }

    /// Return the store for `token`, creating a `Loading` one and starting
    /// the initial session check on a miss.
    pub async fn lookup_or_restore(&self, token: &str) -> Arc<SessionStore> {
        let key = session_key(token);
        if let Some(store) = self.stores.read().await.get(&key) {
            return Arc::clone(store);
        }

        let mut stores = self.stores.write().await;
        if let Some(store) = stores.get(&key) {
            return Arc::clone(store);
        }
        let store = SessionStore::spawn(self.deps.clone(), AuthState::Loading);
        stores.insert(key, Arc::clone(&store));
        drop(stores);

        debug!("restoring session for unknown cookie");
        let seq = store.reserve_restore();
        let restoring = Arc::clone(&store);
        let token = token.to_owned();
        tokio::spawn(async move {
            restoring.restore_reserved(seq, &token).await;
        });
        store
    }

    pub async fn insert(&self, token: &str, store: Arc<SessionStore>) {
        self.stores.write().await.insert(session_key(token), store);
    }

    pub async fn remove(&self, token: &str) -> Option<Arc<SessionStore>> {
        self.stores.write().await.remove(&session_key(token))
    }

    /// Drop `store` from the map if it is still the entry for `token` and
    /// has settled on `Unauthenticated`.
    pub async fn evict_signed_out(&self, token: &str, store: &Arc<SessionStore>) -> bool {
        let key = session_key(token);
        let mut stores = self.stores.write().await;
        let evict = stores.get(&key).is_some_and(|current| {
            Arc::ptr_eq(current, store) && matches!(current.snapshot().state, AuthState::Unauthenticated)
        });
        if evict {
            stores.remove(&key);
        }
        evict
    }

    /// Sign out `token` and forget its store. Works whether or not a live
    /// store exists.
    pub async fn logout(&self, token: Option<&str>) {
        if let Some(token) = token {
            self.end_session(token, false).await;
        }
    }

    /// `logout` through the store's cache-recovery path.
    pub async fn clear_auth_cache(&self, token: Option<&str>) {
        if let Some(token) = token {
            self.end_session(token, true).await;
        }
    }

    /// Remote sign-out falls back to the raw cookie token whenever no
    /// authenticated store revoked a session itself.
    async fn end_session(&self, token: &str, clear_cache: bool) {
        let revoked = match self.remove(token).await {
            Some(store) if clear_cache => store.clear_auth_cache().await,
            Some(store) => store.logout().await,
            None => false,
        };
        if !revoked {
            if let Err(e) = self.deps.backend.sign_out(token).await {
                debug!(error = %e, "remote sign-out for unauthenticated cookie failed");
            }
        }
    }

    /// Deliver `event` to every live store currently signed in as `user_id`.
    /// Returns how many stores were notified.
    pub async fn notify_user(&self, user_id: Uuid, event: &AuthEvent) -> usize {
        let stores = self.stores.read().await;
        let mut notified = 0;
        for store in stores.values() {
            if store.current_user().is_some_and(|u| u.id == user_id) {
                store.notify(event.clone());
                notified += 1;
            }
        }
        notified
    }

    /// Drop stores that have settled on `Unauthenticated`.
    pub async fn sweep(&self) -> usize {
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|_, store| !matches!(store.snapshot().state, AuthState::Unauthenticated));
        before - stores.len()
    }

    pub async fn live_count(&self) -> usize {
        self.stores.read().await.len()
    }
}

/// Spawn the background sweeper that evicts signed-out stores.
pub fn spawn_sweeper(registry: SessionRegistry, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            let evicted = registry.sweep().await;
            if evicted > 0 {
                info!(evicted, "evicted signed-out sessions");
            }
        }
    })
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
