use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::store::FastCache;

use crate::utils::{expires_at_ms, now_ms, rand_simple};

/// Configuration for eviction on set operations.
#[derive(Debug, Clone)]
pub struct EvictOnSetConfig {
    /// Provide a number between 0 and 1 to calculate whether eviction should run on each set.
    ///
    /// - `1.0` -> run eviction on every `set`
    /// - `0.5` -> run eviction on every 2nd `set` (on average)
    /// - `0.0` -> disable eviction
    pub frequency: f64,

    /// Remove items until the number of items in the map is lower than `max_items`.
    pub max_items: usize,
}

/// Configuration for HashMapStore.
#[derive(Debug, Clone, Default)]
pub struct HashMapStoreConfig {
    /// Remove expired entries on every `set` operation.
    pub evict_on_set: Option<EvictOnSetConfig>,
}

/// Internal stored value with expiration time.
#[derive(Clone)]
struct StoredValue {
    expires: i64,
    data: String,
}

/// Thread-safe in-memory fast cache using HashMap with RwLock.
///
/// This is a simple, zero-dependency store suitable for:
/// - Tests and single-process deployments
/// - Small to medium cache sizes (<1000 items)
/// - Applications prioritizing simplicity over performance
///
/// For high-concurrency scenarios, consider using `MokaStore` instead.
pub struct HashMapStore {
    state: RwLock<HashMap<String, StoredValue>>,
    evict_on_set: Option<EvictOnSetConfig>,
}

impl HashMapStore {
    pub fn new(config: HashMapStoreConfig) -> Self {
        HashMapStore {
            state: RwLock::new(HashMap::new()),
            evict_on_set: config.evict_on_set,
        }
    }

    /// Remaining time to live for `key`, or `None` if it is missing or expired.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let state = self.state.read().await;
        let remaining = state.get(key)?.expires - now_ms();
        (remaining > 0).then(|| Duration::from_millis(remaining as u64))
    }

    /// Number of entries held, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.state.write().await.clear();
    }

    /// Run eviction if configured and random check passes.
    async fn maybe_evict(&self) {
        let Some(ref config) = self.evict_on_set else {
            return;
        };

        if config.frequency <= 0.0 {
            return;
        }

        let should_evict = if config.frequency >= 1.0 {
            true
        } else {
            rand_simple() < config.frequency
        };

        if !should_evict {
            return;
        }

        let mut state = self.state.write().await;
        let now = now_ms();

        // First delete all expired entries
        state.retain(|_, v| v.expires > now);

        // If still over max_items, remove the entries closest to expiry
        if state.len() > config.max_items {
            let mut entries: Vec<_> = state.iter().map(|(k, v)| (k.clone(), v.expires)).collect();
            entries.sort_by_key(|(_, expires)| *expires);

            let to_remove = state.len() - config.max_items;
            for (key, _) in entries.into_iter().take(to_remove) {
                state.remove(&key);
            }
        }
    }
}

#[async_trait]
impl FastCache for HashMapStore {
    fn name(&self) -> &'static str {
        "hashmap"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let state = self.state.read().await;

        let Some(stored) = state.get(key) else {
            return Ok(None);
        };

        if stored.expires <= now_ms() {
            // Entry is expired, remove it
            drop(state);
            let mut state = self.state.write().await;
            state.remove(key);
            return Ok(None);
        }

        Ok(Some(stored.data.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        {
            let mut state = self.state.write().await;
            state.insert(
                key.to_string(),
                StoredValue {
                    expires: expires_at_ms(ttl),
                    data: value,
                },
            );
        }

        self.maybe_evict().await;
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<(), CacheError> {
        let mut state = self.state.write().await;

        for key in keys {
            state.remove(*key);
        }

        Ok(())
    }
}
