//! Caches of verified entity statements.
//!
//! Entries are replaced wholesale once `now >= exp`; a fresh hit is returned
//! without re-verification. Statements a subject issues about itself and
//! statements the trust anchor issues about a subject live in separate caches
//! whose kind is fixed at the type level.

use crate::error::FederationResult;
use crate::services::clock::SharedClock;
use fedidp_auth::EntityStatement;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Trust root of the statements held by a cache.
pub trait StatementKind: Send + Sync + 'static {
    const LABEL: &'static str;
}

/// Statements an entity issues about itself, keyed by issuer.
#[derive(Debug)]
pub enum SelfIssued {}

/// Statements the trust anchor issues about a subject, keyed by subject.
#[derive(Debug)]
pub enum AnchorIssued {}

impl StatementKind for SelfIssued {
    const LABEL: &'static str = "self-issued";
}

impl StatementKind for AnchorIssued {
    const LABEL: &'static str = "anchor-issued";
}

#[derive(Debug, Clone)]
struct CachedStatement {
    statement: EntityStatement,
    fetched_at: i64,
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct StatementCacheStats {
    pub cached_entries: usize,
    pub stale_entries: usize,
}

/// Per-key cache of verified statements of one kind.
pub struct StatementCache<K: StatementKind> {
    entries: Arc<RwLock<HashMap<String, CachedStatement>>>,
    clock: SharedClock,
    _kind: PhantomData<fn() -> K>,
}

impl<K: StatementKind> Clone for StatementCache<K> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            clock: Arc::clone(&self.clock),
            _kind: PhantomData,
        }
    }
}

impl<K: StatementKind> StatementCache<K> {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
            _kind: PhantomData,
        }
    }

    /// Return the cached statement if it is still fresh.
    pub async fn get_fresh(&self, key: &str) -> Option<EntityStatement> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|cached| cached.statement.is_fresh_at(now))
            .map(|cached| cached.statement.clone())
    }

    /// Return the fresh cached statement, or run `fetch` and store its result.
    ///
    /// `fetch` must return a statement that already passed verification.
    /// Concurrent misses may fetch redundantly; the last writer wins.
    pub async fn get_or_refresh<F, Fut>(&self, key: &str, fetch: F) -> FederationResult<EntityStatement>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FederationResult<EntityStatement>>,
    {
        if let Some(statement) = self.get_fresh(key).await {
            debug!(kind = K::LABEL, key = %key, "Statement cache hit");
            return Ok(statement);
        }

        debug!(kind = K::LABEL, key = %key, "Statement cache miss, fetching");
        let statement = fetch().await?;
        self.insert(key, statement.clone()).await;
        Ok(statement)
    }

    /// Store a verified statement, replacing any previous entry.
    pub async fn insert(&self, key: &str, statement: EntityStatement) {
        let expires_at = statement.expires_at();
        let cached = CachedStatement {
            statement,
            fetched_at: self.clock.now(),
        };

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), cached);

        info!(kind = K::LABEL, key = %key, expires_at, "Statement cached");
    }

    /// Remove a specific entry from the cache.
    pub async fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_some() {
            debug!(kind = K::LABEL, key = %key, "Statement cache entry invalidated");
        }
    }

    /// When the entry for `key` was stored, if present.
    pub async fn fetched_at(&self, key: &str) -> Option<i64> {
        let entries = self.entries.read().await;
        entries.get(key).map(|cached| cached.fetched_at)
    }

    pub async fn stats(&self) -> StatementCacheStats {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        StatementCacheStats {
            cached_entries: entries.len(),
            stale_entries: entries
                .values()
                .filter(|cached| !cached.statement.is_fresh_at(now))
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FederationError;
    use crate::services::clock::FixedClock;
    use crate::test_fixtures::{statement_signer, NOW};
    use fedidp_auth::TYP_ENTITY_STATEMENT;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn statement(sub: &str, exp: i64) -> EntityStatement {
        let token = statement_signer()
            .sign(
                TYP_ENTITY_STATEMENT,
                &json!({ "iss": sub, "sub": sub, "iat": NOW - 60, "exp": exp }),
                false,
            )
            .unwrap();
        EntityStatement::parse(&token).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_fetch() {
        let clock = FixedClock::new(NOW);
        let cache: StatementCache<SelfIssued> = StatementCache::new(Arc::new(clock));
        let counter = AtomicUsize::new(0);
        let fetches = &counter;

        for _ in 0..3 {
            let result = cache
                .get_or_refresh("https://rp.example", || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(statement("https://rp.example", NOW + 100))
                })
                .await
                .unwrap();
            assert_eq!(result.subject(), "https://rp.example");
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refreshes_exactly_at_exp() {
        let clock = FixedClock::new(NOW);
        let cache: StatementCache<AnchorIssued> = StatementCache::new(Arc::new(clock.clone()));
        cache
            .insert("https://rp.example", statement("https://rp.example", NOW + 100))
            .await;

        clock.set(NOW + 99);
        assert!(cache.get_fresh("https://rp.example").await.is_some());

        clock.set(NOW + 100);
        assert!(cache.get_fresh("https://rp.example").await.is_none());
        assert_eq!(cache.stats().await.stale_entries, 1);

        let refreshed = cache
            .get_or_refresh("https://rp.example", || async {
                Ok(statement("https://rp.example", NOW + 500))
            })
            .await
            .unwrap();
        assert_eq!(refreshed.expires_at(), NOW + 500);
        assert_eq!(cache.fetched_at("https://rp.example").await, Some(NOW + 100));
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cache_untouched() {
        let clock = FixedClock::new(NOW);
        let cache: StatementCache<SelfIssued> = StatementCache::new(Arc::new(clock));

        let result = cache
            .get_or_refresh("https://rp.example", || async {
                Err(FederationError::InvalidSignature("bad".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(cache.stats().await.cached_entries, 0);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let clock = FixedClock::new(NOW);
        let cache: StatementCache<SelfIssued> = StatementCache::new(Arc::new(clock));
        cache
            .insert("https://rp.example", statement("https://rp.example", NOW + 100))
            .await;

        cache.invalidate("https://rp.example").await;
        assert!(cache.get_fresh("https://rp.example").await.is_none());
    }
}
