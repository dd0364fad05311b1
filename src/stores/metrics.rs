//! Metrics for the fast tier and the tiered store.
//!
//! [`MetricsStore`] wraps any [`FastCache`] and emits a metric for every
//! read, write and delete. [`TieredStore::with_metrics`](crate::TieredStore::with_metrics)
//! reports the failures it otherwise swallows, plus flush outcomes, to the same
//! kind of sink.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tiered_store::{FastCache, MokaStore, MokaStoreConfig, MetricsStore};
//!
//! let sink = Arc::new(MyMetricsSink::new());
//!
//! let moka: Arc<dyn FastCache> = Arc::new(MokaStore::new(MokaStoreConfig::default()));
//! let cache: Arc<dyn FastCache> = Arc::new(MetricsStore::new(moka, sink.clone()));
//!
//! let store = TieredStore::new(backing, Some(cache), "users", keyer, options)?
//!     .with_metrics(sink);
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::CacheError;
use crate::store::FastCache;

/// A fast-cache step that failed and was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedOp {
    Get,
    Deserialize,
    Serialize,
    Set,
    Delete,
}

/// Metrics emitted by `MetricsStore` and `TieredStore`.
#[derive(Debug, Clone)]
pub enum CacheMetric {
    /// Emitted on every fast-cache read.
    Read {
        /// The fully qualified cache key.
        key: String,
        /// Whether the key was found.
        hit: bool,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the fast cache (from FastCache::name()).
        tier: String,
    },
    /// Emitted on every fast-cache write.
    Write {
        key: String,
        latency_ms: f64,
        tier: String,
    },
    /// Emitted on every fast-cache delete.
    Remove {
        /// Number of keys in the delete batch.
        key_count: usize,
        /// First key in the batch (for debugging/identification).
        first_key: Option<String>,
        latency_ms: f64,
        tier: String,
    },
    /// A fast-cache failure the tiered store logged and swallowed.
    Degraded {
        collection: String,
        key: String,
        op: DegradedOp,
        error: String,
    },
    /// A queued write could not be persisted during a flush.
    FlushFailed {
        collection: String,
        id: String,
        error: String,
        /// `false` when the failure happened during the final drain and the
        /// write was dropped.
        requeued: bool,
    },
    /// Emitted after every flush pass that had work to do.
    Flushed {
        collection: String,
        persisted: usize,
        failed: usize,
        latency_ms: f64,
    },
}

/// Trait for receiving cache metrics.
///
/// # Example
///
/// ```ignore
/// use std::sync::Mutex;
/// use async_trait::async_trait;
/// use tiered_store::{CacheMetric, MetricsSink};
///
/// struct BufferedSink {
///     buffer: Mutex<Vec<CacheMetric>>,
/// }
///
/// #[async_trait]
/// impl MetricsSink for BufferedSink {
///     fn emit(&self, metric: CacheMetric) {
///         self.buffer.lock().unwrap().push(metric);
///     }
///
///     async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///         // Send buffered metrics to your backend
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Emit a single metric.
    ///
    /// This is called synchronously in the hot path of cache operations and
    /// from the flush worker. Implementations should be fast (e.g., buffer
    /// metrics in memory).
    fn emit(&self, metric: CacheMetric);

    /// Flush any buffered metrics.
    async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// A fast cache wrapper that emits metrics for all operations.
pub struct MetricsStore {
    inner: Arc<dyn FastCache>,
    sink: Arc<dyn MetricsSink>,
    tier_name: String,
}

impl MetricsStore {
    /// Create a new MetricsStore wrapping the given fast cache.
    pub fn new(inner: Arc<dyn FastCache>, sink: Arc<dyn MetricsSink>) -> Self {
        let tier_name = inner.name().to_string();
        MetricsStore {
            inner,
            sink,
            tier_name,
        }
    }
}

#[async_trait]
impl FastCache for MetricsStore {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        let latency_ms = elapsed_ms(start);

        self.sink.emit(CacheMetric::Read {
            key: key.to_string(),
            hit: matches!(result, Ok(Some(_))),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.set(key, value, ttl).await;
        let latency_ms = elapsed_ms(start);

        self.sink.emit(CacheMetric::Write {
            key: key.to_string(),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn delete(&self, keys: &[&str]) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.delete(keys).await;
        let latency_ms = elapsed_ms(start);

        self.sink.emit(CacheMetric::Remove {
            key_count: keys.len(),
            first_key: keys.first().map(|k| k.to_string()),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.inner.close().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stores::memory::{HashMapStore, HashMapStoreConfig};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct TestSink {
        metrics: Mutex<Vec<CacheMetric>>,
        flushes: AtomicUsize,
    }

    impl TestSink {
        pub(crate) fn new() -> Self {
            TestSink {
                metrics: Mutex::new(Vec::new()),
                flushes: AtomicUsize::new(0),
            }
        }

        pub(crate) fn flush_count(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }

        pub(crate) fn take_metrics(&self) -> Vec<CacheMetric> {
            std::mem::take(&mut *self.metrics.lock().unwrap())
        }
    }

    #[async_trait]
    impl MetricsSink for TestSink {
        fn emit(&self, metric: CacheMetric) {
            self.metrics.lock().unwrap().push(metric);
        }

        async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn wrapped() -> (Arc<dyn FastCache>, MetricsStore, Arc<TestSink>) {
        let inner: Arc<dyn FastCache> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let sink = Arc::new(TestSink::new());
        let store = MetricsStore::new(inner.clone(), sink.clone());
        (inner, store, sink)
    }

    #[tokio::test]
    async fn test_read_miss() {
        let (_, store, sink) = wrapped();

        let result = store.get("users:1").await.unwrap();
        assert!(result.is_none());

        let metrics = sink.take_metrics();
        assert_eq!(metrics.len(), 1);

        match &metrics[0] {
            CacheMetric::Read {
                key,
                hit,
                tier,
                latency_ms,
            } => {
                assert_eq!(key, "users:1");
                assert!(!hit);
                assert_eq!(tier, "hashmap");
                assert!(*latency_ms >= 0.0);
            }
            _ => panic!("Expected Read metric"),
        }
    }

    #[tokio::test]
    async fn test_read_hit() {
        let (inner, store, sink) = wrapped();

        inner
            .set("users:1", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let result = store.get("users:1").await.unwrap();
        assert!(result.is_some());

        let metrics = sink.take_metrics();
        assert_eq!(metrics.len(), 1);
        assert!(matches!(&metrics[0], CacheMetric::Read { hit: true, .. }));
    }

    #[tokio::test]
    async fn test_write_metric() {
        let (_, store, sink) = wrapped();

        store
            .set("users:1", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let metrics = sink.take_metrics();
        assert_eq!(metrics.len(), 1);

        match &metrics[0] {
            CacheMetric::Write { key, tier, .. } => {
                assert_eq!(key, "users:1");
                assert_eq!(tier, "hashmap");
            }
            _ => panic!("Expected Write metric"),
        }
    }

    #[tokio::test]
    async fn test_remove_metric() {
        let (_, store, sink) = wrapped();

        store
            .delete(&["users:1", "users:2", "users:3"])
            .await
            .unwrap();

        let metrics = sink.take_metrics();
        assert_eq!(metrics.len(), 1);

        match &metrics[0] {
            CacheMetric::Remove {
                key_count,
                first_key,
                tier,
                ..
            } => {
                assert_eq!(*key_count, 3);
                assert_eq!(first_key.as_deref(), Some("users:1"));
                assert_eq!(tier, "hashmap");
            }
            _ => panic!("Expected Remove metric"),
        }
    }

    #[tokio::test]
    async fn test_remove_empty_keys() {
        let (_, store, sink) = wrapped();

        store.delete(&[]).await.unwrap();

        let metrics = sink.take_metrics();
        match &metrics[0] {
            CacheMetric::Remove {
                key_count,
                first_key,
                ..
            } => {
                assert_eq!(*key_count, 0);
                assert!(first_key.is_none());
            }
            _ => panic!("Expected Remove metric"),
        }
    }
}
