//! The durable tier behind the fast cache.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::options::ErrorPolicy;

/// A durable, keyed collection of `T` (a document collection, a table, ...).
///
/// The backing store receives typed values, never the serialized form used by
/// the fast cache, so it keeps every structured field of `T`.
#[async_trait]
pub trait BackingStore<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Load the value stored under `id`.
    ///
    /// Returns `None` if the id does not exist.
    async fn load(&self, id: &str) -> Result<Option<T>, CacheError>;

    /// Persist `value`, overwriting any previous version with the same id.
    async fn store(&self, value: T) -> Result<T, CacheError>;

    /// Remove `id`. Removing a missing id is not an error.
    async fn remove(&self, id: &str) -> Result<(), CacheError>;

    /// Persist many values.
    ///
    /// The default calls [`store`](BackingStore::store) per value. Stores with a
    /// native batch write should override this with a single round trip.
    async fn bulk_store(&self, values: Vec<T>, policy: ErrorPolicy) -> Result<(), CacheError> {
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

    /// Remove many ids. The default calls [`remove`](BackingStore::remove) per id.
    async fn bulk_remove(&self, ids: Vec<String>, policy: ErrorPolicy) -> Result<(), CacheError> {
        let mut last_err = None;
        for id in ids {
            if let Err(e) = self.remove(&id).await {
                if policy == ErrorPolicy::FailOnFirstError {
                    return Err(e);
                }
                last_err = Some(e);
            }
        }
        last_err.map_or(Ok(()), Err)
    }

    /// Lazily scan every `(id, value)` in the collection.
    fn all(&self) -> BoxStream<'_, Result<(String, T), CacheError>>;
}

type Keyer<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// In-memory backing store, ordered by id.
///
/// Useful for tests, demos and benchmarks. Scans are snapshots taken when the
/// stream is first polled.
pub struct MemoryCollection<T> {
    name: String,
    keyer: Keyer<T>,
    state: RwLock<BTreeMap<String, T>>,
}

impl<T> MemoryCollection<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty collection.
    ///
    /// `keyer` must produce the same id the tiered store derives for the value.
    pub fn new<F>(name: &str, keyer: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        MemoryCollection {
            name: name.to_string(),
            keyer: Arc::new(keyer),
            state: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored values.
    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }

    /// Read a value without going through the trait (test inspection).
    pub async fn get(&self, id: &str) -> Option<T> {
        self.state.read().await.get(id).cloned()
    }
}

#[async_trait]
impl<T> BackingStore<T> for MemoryCollection<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn load(&self, id: &str) -> Result<Option<T>, CacheError> {
        Ok(self.state.read().await.get(id).cloned())
    }

    async fn store(&self, value: T) -> Result<T, CacheError> {
        let id = (self.keyer)(&value);
        self.state.write().await.insert(id, value.clone());
        Ok(value)
    }

    async fn remove(&self, id: &str) -> Result<(), CacheError> {
        self.state.write().await.remove(id);
        Ok(())
    }

    async fn bulk_store(&self, values: Vec<T>, _policy: ErrorPolicy) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        for value in values {
            state.insert((self.keyer)(&value), value);
        }
        Ok(())
    }

    async fn bulk_remove(&self, ids: Vec<String>, _policy: ErrorPolicy) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        for id in &ids {
            state.remove(id);
        }
        Ok(())
    }

    fn all(&self) -> BoxStream<'_, Result<(String, T), CacheError>> {
        stream::once(async move {
            let state = self.state.read().await;
            let items: Vec<_> = state
                .iter()
                .map(|(id, value)| Ok((id.clone(), value.clone())))
                .collect();
            stream::iter(items)
        })
        .flatten()
        .boxed()
    }
}
