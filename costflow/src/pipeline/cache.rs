//! TTL memoization of external-call results.
//!
//! Keys are derived from a namespace and an ordered parameter map, hashed
//! with SHA-256. Values are stored as JSON so one cache can hold results of
//! different types. At most one computation per key is in flight at a time.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use crate::errors::CostflowError;

fn default_ttl_secs() -> u64 {
    3600
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default time-to-live for entries, in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// Default TTL as a duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Deterministic cache key: namespace plus ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    params: BTreeMap<String, String>,
}

impl CacheKey {
    /// Starts a key in the given namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            params: BTreeMap::new(),
        }
    }

    /// Adds a parameter. Re-adding a name replaces its value.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Hashed storage key, `<namespace>:<sha256 hex>`.
    #[must_use]
    pub fn digest(&self) -> String {
        // JSON encoding keeps separators unambiguous, so distinct maps never
        // produce the same preimage.
        let preimage =
            serde_json::to_string(&(&self.namespace, &self.params)).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(preimage.as_bytes());
        format!("{}:{}", self.namespace, hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.namespace)?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that ran the computation.
    pub misses: u64,
}

/// In-memory, per-process result cache safe for concurrent use.
#[derive(Debug)]
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, Arc<AsyncMutex<()>>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default().ttl())
    }
}

impl ResultCache {
    /// Creates a cache with the given default TTL.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a cache from config.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl())
    }

    /// Default TTL used when `get_or_compute` is given none.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the cached value for `key`, or runs `compute`, stores its
    /// result for `ttl` (default TTL when `None`) and returns it.
    ///
    /// Errors from `compute` are returned unchanged and nothing is stored. A
    /// result that cannot be encoded is returned without being stored.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T, CostflowError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CostflowError>>,
    {
        let digest = key.digest();

        if let Some(value) = self.lookup(&digest) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Cache hit");
            return decode(value);
        }

        let lock = self
            .in_flight
            .entry(digest.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let guard = lock.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(value) = self.lookup(&digest) {
            drop(guard);
            self.release(&digest, lock);
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Cache hit after wait");
            return decode(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "Cache miss");

        let result = compute().await;
        if let Ok(value) = &result {
            match serde_json::to_value(value) {
                Ok(encoded) => {
                    let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
                    self.entries.insert(
                        digest.clone(),
                        CacheEntry {
                            value: encoded,
                            expires_at,
                        },
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        key = %key,
                        error = %err,
                        "Result not cacheable, skipping store"
                    );
                }
            }
        }

        drop(guard);
        self.release(&digest, lock);
        result
    }

    /// Returns the cached value without computing.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>, CostflowError> {
        self.lookup(&key.digest()).map(decode).transpose()
    }

    /// Removes an entry. Returns true if one was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.remove(&key.digest()).is_some()
    }

    /// Removes every entry in a namespace. Returns how many were removed.
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        let prefix = format!("{namespace}:");
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(&prefix));
        before - self.entries.len()
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit/miss counters since creation.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn lookup(&self, digest: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(digest) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(digest, |_, entry| entry.is_expired(now));
        None
    }

    fn release(&self, digest: &str, lock: Arc<AsyncMutex<()>>) {
        drop(lock);
        self.in_flight
            .remove_if(digest, |_, l| Arc::strong_count(l) == 1);
    }
}

fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, CostflowError> {
    serde_json::from_value(value).map_err(|e| CostflowError::Serialization(e.to_string()))
}
