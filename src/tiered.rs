use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

use crate::backing::BackingStore;
use crate::error::CacheError;
use crate::options::{CacheOptions, ErrorPolicy, Strategy};
use crate::store::FastCache;
use crate::stores::metrics::{CacheMetric, DegradedOp, MetricsSink};
use crate::utils::build_cache_key;
use crate::worker::{FlushWorker, WorkerState, WriteQueue};

type Keyer<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// TieredStore puts a fast cache in front of a durable backing store.
///
/// Reads and writes are routed according to the [`Strategy`] in its
/// [`CacheOptions`]:
///
/// | strategy | store | load miss |
/// |---|---|---|
/// | `ReadThrough` / `WriteThrough` | cache + backing store, synchronously | backing store, then cache fill |
/// | `WriteBehind` | cache + pending queue, flushed in the background | `NotFound` |
///
/// Fast-cache failures never fail an operation; they are logged and reported
/// to the metrics sink (see [`with_metrics`](TieredStore::with_metrics)).
///
/// One store serves one collection. Values are cached as JSON under
/// `"<collection>:<id>"`, where the id comes from the keyer.
pub struct TieredStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    queue: Arc<WriteQueue<T>>,
    cache: Option<Arc<dyn FastCache>>,
    keyer: Keyer<T>,
    options: CacheOptions,
    worker: Option<FlushWorker>,
}

impl<T> TieredStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a store for `collection`.
    ///
    /// Under [`Strategy::WriteBehind`] this spawns the flush worker, so it must
    /// be called from within a tokio runtime. Neither tier is touched.
    ///
    /// # Errors
    /// `CacheError::Config` if the options are invalid, the collection name is
    /// empty or contains `:`, write-behind is requested without a fast cache,
    /// or write-behind is requested outside a tokio runtime.
    ///
    /// # Example
    /// ```ignore
    /// let users = TieredStore::new(
    ///     backing,
    ///     Some(Arc::new(MokaStore::new(MokaStoreConfig::default()))),
    ///     "users",
    ///     |u: &User| u.id.clone(),
    ///     CacheOptions::default().with_strategy(Strategy::WriteBehind),
    /// )?;
    /// ```
    pub fn new<F>(
        backing: Arc<dyn BackingStore<T>>,
        cache: Option<Arc<dyn FastCache>>,
        collection: &str,
        keyer: F,
        options: CacheOptions,
    ) -> Result<Self, CacheError>
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        options.validate()?;

        if collection.is_empty() || collection.contains(':') {
            return Err(CacheError::Config(format!(
                "collection name '{}' must be non-empty and must not contain ':'",
                collection
            )));
        }

        let queue = Arc::new(WriteQueue::new(collection, backing));

        let worker = match options.strategy {
            Strategy::WriteBehind => {
                if cache.is_none() {
                    return Err(CacheError::Config(
                        "write-behind requires a fast cache".into(),
                    ));
                }
                tokio::runtime::Handle::try_current().map_err(|e| {
                    CacheError::Config(format!("write-behind requires a tokio runtime: {}", e))
                })?;
                Some(FlushWorker::spawn(
                    queue.clone(),
                    options.write_behind_interval,
                ))
            }
            Strategy::ReadThrough | Strategy::WriteThrough => None,
        };

        Ok(TieredStore {
            queue,
            cache,
            keyer: Arc::new(keyer),
            options,
            worker,
        })
    }

    /// Report swallowed fast-cache failures and flush outcomes to `sink`.
    ///
    /// Only the first sink attached to a store is kept.
    pub fn with_metrics(self, sink: Arc<dyn MetricsSink>) -> Self {
        if !self.queue.set_metrics(sink) {
            tracing::debug!(
                "Metrics sink already attached: collection={}",
                self.collection()
            );
        }
        self
    }

    pub fn collection(&self) -> &str {
        self.queue.collection()
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Load the value stored under `id`.
    ///
    /// A fast-cache hit is returned as is. On a miss the read-through and
    /// write-through strategies fall back to the backing store and fill the
    /// cache; write-behind reports `NotFound`, since the backing store may lag
    /// behind unflushed writes.
    pub async fn load(&self, id: &str) -> Result<T, CacheError> {
        if let Some(value) = self.cache_get(id).await {
            return Ok(value);
        }

        match self.options.strategy {
            Strategy::WriteBehind => Err(CacheError::not_found(self.collection(), id)),
            Strategy::ReadThrough | Strategy::WriteThrough => {
                let value = self
                    .queue
                    .backing()
                    .load(id)
                    .await?
                    .ok_or_else(|| CacheError::not_found(self.collection(), id))?;

                self.cache_put(id, &value).await;
                Ok(value)
            }
        }
    }

    /// Store `value` under the id the keyer derives from it.
    ///
    /// The fast cache is always updated first. Write-behind then queues the
    /// value and returns without touching the backing store; the other
    /// strategies return the backing store's result.
    pub async fn store(&self, value: T) -> Result<T, CacheError> {
        let id = (self.keyer)(&value);
        self.cache_put(&id, &value).await;

        match self.options.strategy {
            Strategy::WriteBehind => {
                self.queue.enqueue(id, value.clone()).await;
                Ok(value)
            }
            Strategy::ReadThrough | Strategy::WriteThrough => {
                self.queue.backing().store(value).await
            }
        }
    }

    /// Remove `id` from both tiers.
    ///
    /// A write still queued for `id` is dropped so the next flush cannot
    /// resurrect it. The backing store's result is returned.
    ///
    /// Under write-behind a value already taken by an in-flight flush is not
    /// covered: if that write succeeds it lands after the removal, and if it
    /// fails it is re-queued and written on the next tick.
    pub async fn remove(&self, id: &str) -> Result<(), CacheError> {
        self.cache_delete(&[id]).await;

        if self.options.strategy == Strategy::WriteBehind {
            self.queue.cancel(&[id]).await;
        }

        self.queue.backing().remove(id).await
    }

    /// Store every value in `values`.
    ///
    /// Write-behind replays [`store`](TieredStore::store) per value under
    /// `policy`. The synchronous strategies fill the cache per value and hand
    /// the whole batch to the backing store in one call.
    pub async fn bulk_store<I>(&self, values: I, policy: ErrorPolicy) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = T> + Send,
        I::IntoIter: Send,
    {
        match self.options.strategy {
            Strategy::WriteBehind => {
                let mut last_err = None;
                for value in values {
                    if let Err(e) = self.store(value).await {
                        if policy == ErrorPolicy::FailOnFirstError {
                            return Err(e);
                        }
                        last_err = Some(e);
                    }
                }
                last_err.map_or(Ok(()), Err)
            }
            Strategy::ReadThrough | Strategy::WriteThrough => {
                let mut batch = Vec::new();
                for value in values {
                    let id = (self.keyer)(&value);
                    self.cache_put(&id, &value).await;
                    batch.push(value);
                }
                self.queue.backing().bulk_store(batch, policy).await
            }
        }
    }

    /// Remove every id in `ids` from both tiers and the pending queue.
    pub async fn bulk_remove<I>(&self, ids: I, policy: ErrorPolicy) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = String> + Send,
    {
        let ids: Vec<String> = ids.into_iter().collect();
        if ids.is_empty() {
            return Ok(());
        }

        {
            let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
            if self.options.strategy == Strategy::WriteBehind {
                self.queue.cancel(&id_refs).await;
            }
            self.cache_delete(&id_refs).await;
        }

        self.queue.backing().bulk_remove(ids, policy).await
    }

    /// Lazily [`load`](TieredStore::load) each id, in order.
    ///
    /// Nothing is loaded until the stream is polled, and loading stops as
    /// soon as the consumer stops polling or drops the stream.
    pub fn bulk_load<'a, I>(&'a self, ids: I) -> BoxStream<'a, Result<T, CacheError>>
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'a,
    {
        stream::iter(ids)
            .then(move |id| async move { self.load(&id).await })
            .boxed()
    }

    /// Scan the whole collection from the backing store.
    ///
    /// The fast cache is never consulted, and under write-behind unflushed
    /// writes are not included.
    pub fn all(&self) -> BoxStream<'_, Result<(String, T), CacheError>> {
        self.queue.backing().all()
    }

    /// Flush the pending queue now, from the calling task.
    ///
    /// Failed writes are re-queued as on a regular tick. Returns the number of
    /// writes persisted; always zero unless the strategy is write-behind.
    pub async fn flush_now(&self) -> usize {
        self.queue.flush(true).await
    }

    /// Number of writes waiting for the next flush.
    pub async fn pending_len(&self) -> usize {
        self.queue.len().await
    }

    /// State of the flush worker, or `None` if the strategy runs without one.
    pub fn worker_state(&self) -> Option<WorkerState> {
        self.worker.as_ref().map(FlushWorker::state)
    }

    /// Stop the flush worker and close the fast cache.
    ///
    /// Under write-behind this waits for one final flush of the pending queue.
    /// Writes that fail during that flush are logged and dropped. The metrics
    /// sink, if attached, is flushed afterwards. Returns the fast cache's close
    /// error, if any.
    pub async fn close(mut self) -> Result<(), CacheError> {
        if let Some(worker) = self.worker.take() {
            worker.stop().await;
        }
        self.queue.flush_metrics().await;

        match &self.cache {
            Some(cache) => cache.close().await,
            None => Ok(()),
        }
    }

    fn cache_key(&self, id: &str) -> String {
        build_cache_key(self.collection(), id)
    }

    /// Read and decode `id` from the fast cache. Any failure counts as a miss.
    async fn cache_get(&self, id: &str) -> Option<T> {
        let cache = self.cache.as_ref()?;
        let key = self.cache_key(id);

        match cache.get(&key).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(value) => {
                    tracing::debug!("Fast cache hit: collection={}, key={}", self.collection(), key);
                    Some(value)
                }
                Err(e) => {
                    self.degraded(&key, DegradedOp::Deserialize, e.to_string());
                    None
                }
            },
            Ok(None) => {
                tracing::debug!("Fast cache miss: collection={}, key={}", self.collection(), key);
                None
            }
            Err(e) => {
                self.degraded(&key, DegradedOp::Get, e.to_string());
                None
            }
        }
    }

    /// Best-effort write of `value` to the fast cache with the configured TTL.
    async fn cache_put(&self, id: &str, value: &T) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let key = self.cache_key(id);

        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                self.degraded(&key, DegradedOp::Serialize, e.to_string());
                return;
            }
        };

        if let Err(e) = cache.set(&key, data, self.options.ttl).await {
            self.degraded(&key, DegradedOp::Set, e.to_string());
        }
    }

    /// Best-effort delete of `ids` from the fast cache.
    async fn cache_delete(&self, ids: &[&str]) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };

        let keys: Vec<String> = ids.iter().map(|id| self.cache_key(id)).collect();
        let key_refs: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();

        if let Err(e) = cache.delete(&key_refs).await {
            self.degraded(&keys.join(","), DegradedOp::Delete, e.to_string());
        }
    }

    fn degraded(&self, key: &str, op: DegradedOp, error: String) {
        tracing::warn!(
            "Fast cache {:?} failed, continuing without it: collection={}, key={}, error={}",
            op,
            self.collection(),
            key,
            error
        );
        self.queue.emit(CacheMetric::Degraded {
            collection: self.collection().to_string(),
            key: key.to_string(),
            op,
            error,
        });
    }
}
