use async_trait::async_trait;
use futures::stream::BoxStream;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tiered_store::{BackingStore, CacheError, ErrorPolicy, MemoryCollection};

/// Test data structure for benchmarks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchUser {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub score: u32,
}

impl BenchUser {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            name: format!("User {}", id),
            email: format!("user{}@example.com", id),
            score: (id % 1000) as u32,
        }
    }

    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

/// In-memory collection that sleeps before every call to simulate a database
pub struct SlowCollection {
    inner: MemoryCollection<BenchUser>,
    latency: Duration,
    query_count: AtomicUsize,
}

impl SlowCollection {
    pub async fn new(num_users: usize, latency_ms: u64) -> Self {
        let inner = MemoryCollection::new("users", BenchUser::key);
        let users = (0..num_users as u64).map(BenchUser::new).collect();
        // MemoryCollection never fails
        let _ = inner.bulk_store(users, ErrorPolicy::default()).await;

        Self {
            inner,
            latency: Duration::from_millis(latency_ms),
            query_count: AtomicUsize::new(0),
        }
    }

    async fn round_trip(&self) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;
    }

    #[allow(dead_code)]
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    #[allow(dead_code)]
    pub fn reset_count(&self) {
        self.query_count.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl BackingStore<BenchUser> for SlowCollection {
    async fn load(&self, id: &str) -> Result<Option<BenchUser>, CacheError> {
        self.round_trip().await;
        self.inner.load(id).await
    }

    async fn store(&self, value: BenchUser) -> Result<BenchUser, CacheError> {
        self.round_trip().await;
        self.inner.store(value).await
    }

    async fn remove(&self, id: &str) -> Result<(), CacheError> {
        self.round_trip().await;
        self.inner.remove(id).await
    }

    async fn bulk_store(&self, values: Vec<BenchUser>, policy: ErrorPolicy) -> Result<(), CacheError> {
        self.round_trip().await;
        self.inner.bulk_store(values, policy).await
    }

    fn all(&self) -> BoxStream<'_, Result<(String, BenchUser), CacheError>> {
        self.inner.all()
    }
}

/// Generate test ids for different workload patterns
pub struct KeyGenerator {
    num_keys: usize,
}

impl KeyGenerator {
    pub fn new(num_keys: usize) -> Self {
        Self { num_keys }
    }

    /// Generate sequential ids (for cold cache tests)
    pub fn sequential(&self) -> Vec<String> {
        (0..self.num_keys).map(|i| i.to_string()).collect()
    }

    /// Generate random ids with uniform distribution
    #[allow(dead_code)]
    pub fn uniform_random(&self, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| rng.gen_range(0..self.num_keys).to_string())
            .collect()
    }

    /// Generate ids with Zipf distribution (realistic - few hot keys)
    #[allow(dead_code)]
    pub fn zipf_random(&self, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let mut keys = Vec::with_capacity(count);

        for _ in 0..count {
            // Simplified Zipf: 80% of requests go to 20% of keys
            let key_id = if rng.gen_bool(0.8) {
                rng.gen_range(0..(self.num_keys / 5))
            } else {
                rng.gen_range((self.num_keys / 5)..self.num_keys)
            };
            keys.push(key_id.to_string());
        }

        keys
    }

    /// Generate ids for mixed workload (some hits, some misses)
    pub fn mixed(&self, hit_ratio: f64) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let hot_key_count = (self.num_keys as f64 * hit_ratio) as usize;

        (0..1000)
            .map(|_| {
                if rng.gen_bool(hit_ratio) {
                    rng.gen_range(0..hot_key_count).to_string()
                } else {
                    rng.gen_range(hot_key_count..self.num_keys).to_string()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    async fn test_slow_collection() {
        use super::SlowCollection;
        use tiered_store::BackingStore;

        let db = SlowCollection::new(100, 1).await;

        let user = db.load("0").await.unwrap();
        assert_eq!(user.unwrap().id, 0);
        assert!(db.load("100").await.unwrap().is_none());

        assert_eq!(db.query_count(), 2);
    }

    #[test]
    fn test_key_generator() {
        use super::KeyGenerator;

        let key_gen = KeyGenerator::new(100);

        let seq = key_gen.sequential();
        assert_eq!(seq.len(), 100);
        assert_eq!(seq[0], "0");

        let uniform = key_gen.uniform_random(50);
        assert_eq!(uniform.len(), 50);

        let zipf = key_gen.zipf_random(100);
        assert_eq!(zipf.len(), 100);
    }
}
