use async_trait::async_trait;
use std::time::Duration;

use crate::error::CacheError;

/// A fast cache is a low-latency key/value store with per-key expiration.
///
/// Values are opaque serialized strings (JSON produced by the tiered store).
/// Keys are fully qualified (`collection:id`); the fast cache never interprets them.
///
/// The implementation is responsible for expiring entries after their TTL and
/// for any capacity-based eviction.
#[async_trait]
pub trait FastCache: Send + Sync {
    /// A name for metrics/tracing.
    ///
    /// # Example
    /// - "hashmap"
    /// - "moka"
    /// - "redis"
    fn name(&self) -> &'static str;

    /// Return the serialized value for `key`.
    ///
    /// The response must be `None` for misses and expired entries.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Removes the key(s) from the cache.
    async fn delete(&self, keys: &[&str]) -> Result<(), CacheError>;

    /// Release any connection held by the cache.
    ///
    /// The default does nothing, which suits in-process caches.
    async fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
