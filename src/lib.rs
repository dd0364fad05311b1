//! tiered-store - A strategy-configurable cache store for Rust
//!
//! This library puts a fast, TTL-based cache in front of a durable keyed
//! collection and lets each deployment choose its durability/latency tradeoff:
//! - Read-through: misses fall back to the backing store and fill the cache
//! - Write-through: writes are persisted before the call returns
//! - Write-behind: writes are queued (one per id) and flushed in the background
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tiered_store::{CacheOptions, MemoryCollection, MokaStore, MokaStoreConfig, Strategy, TieredStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tiered_store::CacheError> {
//!     let backing = Arc::new(MemoryCollection::new("users", |u: &User| u.id.clone()));
//!     let options = CacheOptions::default()
//!         .with_strategy(Strategy::WriteBehind)
//!         .with_write_behind_interval(Duration::from_millis(500));
//!     let cache = Arc::new(MokaStore::new(MokaStoreConfig::from_options(&options)));
//!
//!     let users = TieredStore::new(backing, Some(cache), "users", |u: &User| u.id.clone(), options)?;
//!
//!     users.store(User { id: "u1".into(), name: "Alice".into() }).await?;
//!     let alice = users.load("u1").await?;
//!
//!     // Drains the pending queue before returning
//!     users.close().await
//! }
//! ```

mod backing;
mod error;
mod options;
mod store;
pub mod stores;
mod tiered;
mod utils;
mod worker;

// Re-export public API
pub use backing::{BackingStore, MemoryCollection};
pub use error::CacheError;
pub use options::{CacheOptions, ErrorPolicy, Strategy};
pub use store::FastCache;
pub use stores::memory::{EvictOnSetConfig, HashMapStore, HashMapStoreConfig};
pub use stores::metrics::{CacheMetric, DegradedOp, MetricsSink, MetricsStore};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use stores::redis::{RedisStore, RedisStoreConfig};
pub use tiered::TieredStore;
pub use utils::build_cache_key;
pub use worker::WorkerState;
