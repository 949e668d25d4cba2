//! Bounded store of authorization sessions.
//!
//! Sessions are keyed by `state` and indexed by `request_uri` and by
//! authorization code. The store holds at most `capacity` sessions; inserting
//! beyond that evicts the earliest-inserted entry (FIFO, not LRU). Expiry is
//! checked on lookup only.

use crate::services::claims::ClaimsInfo;
use crate::services::clock::SharedClock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Maximum number of sessions held at once.
pub const MAX_SESSIONS: usize = 10_000;

/// Lifetime of a session from its creation.
pub const SESSION_TTL_SECS: i64 = 90;

/// One authorization session, created by a pushed authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub state: String,
    pub client_id: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub nonce: String,
    pub requested_scopes: Vec<String>,
    pub claims_info: ClaimsInfo,
    pub redirect_uri: String,
    pub authorization_code: String,
    pub request_uri: String,
    pub expires_at: i64,
}

impl AuthSession {
    #[must_use]
    pub fn is_usable_at(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, AuthSession>,
    order: VecDeque<String>,
    by_request_uri: HashMap<String, String>,
    by_code: HashMap<String, String>,
}

impl Inner {
    fn index(&mut self, session: &AuthSession) {
        self.by_request_uri
            .insert(session.request_uri.clone(), session.state.clone());
        self.by_code
            .insert(session.authorization_code.clone(), session.state.clone());
    }

    fn unindex(&mut self, session: &AuthSession) {
        if self.by_request_uri.get(&session.request_uri) == Some(&session.state) {
            self.by_request_uri.remove(&session.request_uri);
        }
        if self.by_code.get(&session.authorization_code) == Some(&session.state) {
            self.by_code.remove(&session.authorization_code);
        }
    }

    fn evict_oldest(&mut self) -> Option<AuthSession> {
        let state = self.order.pop_front()?;
        let session = self.sessions.remove(&state)?;
        self.unindex(&session);
        Some(session)
    }
}

/// Shared handle to the session store.
#[derive(Clone)]
pub struct AuthSessionStore {
    inner: Arc<Mutex<Inner>>,
    capacity: usize,
    clock: SharedClock,
}

impl AuthSessionStore {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_capacity(MAX_SESSIONS, clock)
    }

    pub fn with_capacity(capacity: usize, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            capacity: capacity.max(1),
            clock,
        }
    }

    /// Insert a session, returning the session evicted to make room, if any.
    ///
    /// Re-inserting an existing `state` replaces the session in place and
    /// keeps its position in the eviction order.
    pub async fn insert(&self, session: AuthSession) -> Option<AuthSession> {
        let mut inner = self.inner.lock().await;

        if let Some(previous) = inner.sessions.remove(&session.state) {
            inner.unindex(&previous);
        } else {
            inner.order.push_back(session.state.clone());
        }
        inner.index(&session);
        inner.sessions.insert(session.state.clone(), session);

        let mut evicted = None;
        while inner.sessions.len() > self.capacity {
            evicted = inner.evict_oldest();
            if let Some(session) = &evicted {
                debug!(state = %session.state, client_id = %session.client_id, "Evicted oldest session");
            }
        }
        evicted
    }

    /// Look up a usable session by `state`.
    pub async fn get(&self, state: &str) -> Option<AuthSession> {
        let inner = self.inner.lock().await;
        self.usable(inner.sessions.get(state))
    }

    /// Look up a usable session by its `request_uri`.
    pub async fn find_by_request_uri(&self, request_uri: &str) -> Option<AuthSession> {
        let inner = self.inner.lock().await;
        let session = inner
            .by_request_uri
            .get(request_uri)
            .and_then(|state| inner.sessions.get(state));
        self.usable(session)
    }

    /// Look up a usable session by its authorization code.
    pub async fn find_by_code(&self, code: &str) -> Option<AuthSession> {
        let inner = self.inner.lock().await;
        let session = inner
            .by_code
            .get(code)
            .and_then(|state| inner.sessions.get(state));
        self.usable(session)
    }

    /// Number of stored sessions, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn usable(&self, session: Option<&AuthSession>) -> Option<AuthSession> {
        let now = self.clock.now();
        session.filter(|s| s.is_usable_at(now)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::FixedClock;

    const NOW: i64 = 1_700_000_000;

    fn session(state: &str) -> AuthSession {
        AuthSession {
            state: state.to_string(),
            client_id: "https://rp.example".to_string(),
            code_challenge: "challenge".to_string(),
            code_challenge_method: "S256".to_string(),
            nonce: "nonce".to_string(),
            requested_scopes: vec!["openid".to_string()],
            claims_info: ClaimsInfo::default(),
            redirect_uri: "https://rp.example/cb".to_string(),
            authorization_code: format!("code-{state}"),
            request_uri: format!("urn:https://rp.example:{state}"),
            expires_at: NOW + SESSION_TTL_SECS,
        }
    }

    fn store(capacity: usize) -> (AuthSessionStore, FixedClock) {
        let clock = FixedClock::new(NOW);
        (
            AuthSessionStore::with_capacity(capacity, Arc::new(clock.clone())),
            clock,
        )
    }

    #[tokio::test]
    async fn test_lookup_by_all_keys() {
        let (store, _) = store(10);
        store.insert(session("s1")).await;

        assert_eq!(store.get("s1").await.unwrap().state, "s1");
        assert_eq!(
            store
                .find_by_request_uri("urn:https://rp.example:s1")
                .await
                .unwrap()
                .state,
            "s1"
        );
        assert_eq!(store.find_by_code("code-s1").await.unwrap().state, "s1");
        assert!(store.find_by_code("code-s2").await.is_none());
    }

    #[tokio::test]
    async fn test_overflow_evicts_earliest_inserted() {
        let (store, _) = store(3);
        for state in ["s1", "s2", "s3"] {
            assert!(store.insert(session(state)).await.is_none());
        }

        // Reading does not refresh the position.
        store.get("s1").await;

        let evicted = store.insert(session("s4")).await.unwrap();
        assert_eq!(evicted.state, "s1");
        assert_eq!(store.len().await, 3);
        assert!(store.get("s1").await.is_none());
        assert!(store.find_by_code("code-s1").await.is_none());
        assert!(store
            .find_by_request_uri("urn:https://rp.example:s1")
            .await
            .is_none());
        assert!(store.get("s2").await.is_some());
    }

    #[tokio::test]
    async fn test_reinsert_replaces_and_keeps_position() {
        let (store, _) = store(2);
        store.insert(session("s1")).await;
        store.insert(session("s2")).await;

        let mut replacement = session("s1");
        replacement.authorization_code = "code-new".to_string();
        assert!(store.insert(replacement).await.is_none());

        assert!(store.find_by_code("code-s1").await.is_none());
        assert_eq!(store.find_by_code("code-new").await.unwrap().state, "s1");

        let evicted = store.insert(session("s3")).await.unwrap();
        assert_eq!(evicted.state, "s1");
    }

    #[tokio::test]
    async fn test_usable_until_expiry() {
        let (store, clock) = store(10);
        store.insert(session("s1")).await;

        clock.advance(SESSION_TTL_SECS - 1);
        assert!(store.get("s1").await.is_some());

        clock.advance(1);
        assert!(store.get("s1").await.is_none());
        assert!(store.find_by_code("code-s1").await.is_none());
        // Expired sessions are not swept.
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_default_capacity() {
        let store = AuthSessionStore::new(Arc::new(FixedClock::new(NOW)));
        assert_eq!(store.capacity, MAX_SESSIONS);
        assert!(store.is_empty().await);
    }
}
