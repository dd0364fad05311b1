//! Configuration for [`TieredStore`](crate::TieredStore).

use std::time::Duration;

use crate::error::CacheError;

/// How writes and reads are routed between the fast cache and the backing store.
///
/// The strategy is fixed for the lifetime of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Writes are persisted synchronously; reads fall back to the backing store.
    WriteThrough,
    /// Writes land in the fast cache and a pending queue that is flushed
    /// periodically. Reads are served from the fast cache only.
    WriteBehind,
    /// Reads fall back to the backing store on a miss and populate the cache.
    #[default]
    ReadThrough,
}

/// Error handling for bulk operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort on the first error and return it.
    FailOnFirstError,
    /// Keep processing, returning the last error seen.
    #[default]
    ContinueCollectingErrors,
}

/// Options for a tiered store.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// How long a cached entry stays valid in the fast tier.
    pub ttl: Duration,

    /// Advisory maximum entry count.
    ///
    /// Enforced by the fast cache backend (see `MokaStoreConfig::from_options`),
    /// never by the tiered store itself.
    pub capacity: u64,

    pub strategy: Strategy,

    /// Period between automatic flushes. Only used with [`Strategy::WriteBehind`].
    pub write_behind_interval: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            capacity: 10_000,
            strategy: Strategy::ReadThrough,
            write_behind_interval: Duration::from_secs(5),
        }
    }
}

impl CacheOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fast-cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the advisory capacity.
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the write-behind flush interval.
    pub fn with_write_behind_interval(mut self, interval: Duration) -> Self {
        self.write_behind_interval = interval;
        self
    }

    /// Check the options for values the store cannot run with.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.ttl.is_zero() {
            return Err(CacheError::Config("ttl must be greater than zero".into()));
        }
        if self.strategy == Strategy::WriteBehind && self.write_behind_interval.is_zero() {
            return Err(CacheError::Config(
                "write_behind_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
