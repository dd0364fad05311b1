//! Shared utilities for the store.

use std::fmt::Display;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Build the fast-cache key for an id within a collection.
///
/// Format: `{collection}:{id}`
pub fn build_cache_key<N: Display + ?Sized>(collection: &N, id: &str) -> String {
    format!("{}:{}", collection, id)
}

/// Get the current time in milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Absolute expiry timestamp (unix millis) for an entry written now with `ttl`.
pub fn expires_at_ms(ttl: Duration) -> i64 {
    now_ms().saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64)
}

/// Simple pseudo-random number generator (0.0 to 1.0).
/// Only used to sample evict-on-set, which needs no real randomness, so the
/// library keeps `rand` out of its runtime dependencies.
pub fn rand_simple() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
    );
    (hasher.finish() as f64) / (u64::MAX as f64)
}
