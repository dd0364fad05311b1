//! Example demonstrating write-behind stores sharing one fast cache.
//!
//! Two collections with different value types share a single Moka instance.
//! Writes land in the fast cache immediately and reach the backing
//! collections on the next flush, or when the stores are closed.

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tiered_store::{
    CacheMetric, CacheOptions, ErrorPolicy, FastCache, MemoryCollection, MetricsSink, MokaStore,
    MokaStoreConfig, Strategy, TieredStore,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct User {
    id: String,
    name: String,
    email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ApiKey {
    key: String,
    user_id: String,
    created_at: i64,
}

/// Prints flush outcomes as they happen.
struct PrintSink;

#[async_trait]
impl MetricsSink for PrintSink {
    fn emit(&self, metric: CacheMetric) {
        if let CacheMetric::Flushed {
            collection,
            persisted,
            failed,
            latency_ms,
        } = metric
        {
            println!(
                "  [flush] {}: persisted={} failed={} ({:.2}ms)",
                collection, persisted, failed, latency_ms
            );
        }
    }

    async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = CacheOptions::default()
        .with_strategy(Strategy::WriteBehind)
        .with_ttl(Duration::from_secs(60))
        .with_write_behind_interval(Duration::from_millis(200));

    // One fast cache shared by both collections; keys are namespaced per collection
    let fast: Arc<dyn FastCache> = Arc::new(MokaStore::new(MokaStoreConfig::from_options(&options)));

    let user_db = Arc::new(MemoryCollection::new("users", |u: &User| u.id.clone()));
    let key_db = Arc::new(MemoryCollection::new("apikeys", |k: &ApiKey| k.key.clone()));

    let users = TieredStore::new(
        user_db.clone(),
        Some(fast.clone()),
        "users",
        |u: &User| u.id.clone(),
        options.clone(),
    )?
    .with_metrics(Arc::new(PrintSink));

    let api_keys = TieredStore::new(
        key_db.clone(),
        Some(fast),
        "apikeys",
        |k: &ApiKey| k.key.clone(),
        options,
    )?;

    println!("Storing users (three writes to one id)...");
    for name in ["Chronark", "Chronark II", "Chronark III"] {
        users
            .store(User {
                id: "chronark".to_string(),
                name: name.to_string(),
                email: "chronark@example.com".to_string(),
            })
            .await?;
    }
    println!("  pending writes: {}", users.pending_len().await);

    api_keys
        .bulk_store(
            (0..3).map(|i| ApiKey {
                key: format!("key_{}", i),
                user_id: "chronark".to_string(),
                created_at: 1_700_000_000 + i,
            }),
            ErrorPolicy::ContinueCollectingErrors,
        )
        .await?;

    // Served from the fast cache before anything was flushed
    let user = users.load("chronark").await?;
    println!("Loaded from fast cache: {:?}", user);
    println!("  backing store has user: {}", user_db.get("chronark").await.is_some());

    println!("Waiting for the flush worker...");
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("  backing store has user: {:?}", user_db.get("chronark").await);

    // Removing an unflushed key cancels its pending write
    api_keys.remove("key_1").await?;

    let all: Vec<(String, User)> = users.all().try_collect().await?;
    println!("All users in backing store: {}", all.len());

    users.close().await?;
    api_keys.close().await?;
    println!("Closed; api keys persisted: {}", key_db.len().await);

    Ok(())
}
