//! Fast cache implementations.

pub mod memory;
pub mod metrics;
pub mod moka;
pub mod redis;

pub use memory::{EvictOnSetConfig, HashMapStore, HashMapStoreConfig};
pub use metrics::{CacheMetric, DegradedOp, MetricsSink, MetricsStore};
pub use moka::{MokaStore, MokaStoreConfig};
pub use redis::{RedisStore, RedisStoreConfig};
