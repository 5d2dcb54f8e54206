//! Time-bounded market list cache with single-flight refill.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::Cryptocurrency;
use crate::reconciler::{MarketDataReconciler, ReconcileMode};
use crate::store::{CryptoRepository, StoreError};

pub const MARKET_LIST_CACHE_KEY: &str = "cryptocurrencies.market_list";
pub const DEFAULT_MARKET_LIST_TTL: Duration = Duration::from_secs(300);

pub type MarketList = Arc<Vec<Cryptocurrency>>;

/// Named slots holding a market list until an expiry instant.
pub trait MarketListCache: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<MarketList>;
    fn put(&self, key: &str, value: MarketList, ttl: Duration);
    fn forget(&self, key: &str);
}

struct CacheEntry {
    value: MarketList,
    expires_at: Instant,
}

/// Process-local cache on the tokio clock.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarketListCache for InMemoryCache {
    fn get(&self, key: &str) -> Option<MarketList> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| Arc::clone(&entry.value))
    }

    fn put(&self, key: &str, value: MarketList, ttl: Duration) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn forget(&self, key: &str) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(key);
    }
}

/// Read path for "all cryptocurrencies by market cap".
///
/// Fills are serialized behind `fill_lock`, so a burst of readers on a cold or
/// expired slot produces one storage query and at most one reconciliation.
pub struct ReadCache {
    cache: Arc<dyn MarketListCache>,
    repo: Arc<dyn CryptoRepository>,
    reconciler: Arc<MarketDataReconciler>,
    ttl: Duration,
    request_mode: ReconcileMode,
    fill_lock: Mutex<()>,
}

impl ReadCache {
    pub fn new(
        cache: Arc<dyn MarketListCache>,
        repo: Arc<dyn CryptoRepository>,
        reconciler: Arc<MarketDataReconciler>,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            repo,
            reconciler,
            ttl,
            request_mode: ReconcileMode::Fast,
            fill_lock: Mutex::new(()),
        }
    }

    /// Mode for reconciliations triggered by readers. Defaults to `Fast`.
    pub fn with_request_mode(mut self, mode: ReconcileMode) -> Self {
        self.request_mode = mode;
        self
    }

    pub fn invalidate(&self) {
        self.cache.forget(MARKET_LIST_CACHE_KEY);
    }

    pub async fn get_market_list(&self, force_refresh: bool) -> Result<MarketList, StoreError> {
        if force_refresh {
            self.invalidate();
            info!(
                component = "cache",
                event = "cache.force_refresh",
                key = MARKET_LIST_CACHE_KEY
            );
            self.reconciler.reconcile(self.request_mode).await;
        } else if let Some(hit) = self.cache.get(MARKET_LIST_CACHE_KEY) {
            debug!(
                component = "cache",
                event = "cache.hit",
                key = MARKET_LIST_CACHE_KEY,
                rows = hit.len()
            );
            return Ok(hit);
        }

        let _filling = self.fill_lock.lock().await;
        if !force_refresh {
            if let Some(hit) = self.cache.get(MARKET_LIST_CACHE_KEY) {
                debug!(
                    component = "cache",
                    event = "cache.hit.after_wait",
                    key = MARKET_LIST_CACHE_KEY,
                    rows = hit.len()
                );
                return Ok(hit);
            }
        }

        info!(
            component = "cache",
            event = "cache.miss",
            key = MARKET_LIST_CACHE_KEY
        );
        // Read before the query: a pass finishing after this point may have
        // filled storage behind the empty result below.
        let seen_passes = self.reconciler.completed_passes();
        let mut rows = self.repo.list_by_market_cap()?;

        if rows.is_empty() && !force_refresh {
            info!(
                component = "cache",
                event = "cache.cold_start",
                key = MARKET_LIST_CACHE_KEY,
                mode = self.request_mode.as_str()
            );
            self.reconciler
                .reconcile_unless_ran_since(self.request_mode, seen_passes)
                .await;
            rows = self.repo.list_by_market_cap()?;
        }

        let value: MarketList = Arc::new(rows);
        self.cache
            .put(MARKET_LIST_CACHE_KEY, Arc::clone(&value), self.ttl);
        Ok(value)
    }
}
