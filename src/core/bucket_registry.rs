//! Per-client registry of token buckets.
//!
//! Buckets are created lazily on a client's first request. Lookups take the
//! shared lock only; the exclusive lock is taken on a miss and the map is
//! re-checked under it, so concurrent first requests from one client always
//! end up sharing a single bucket. `allow` on the bucket itself runs after the
//! registry lock has been released.
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

use crate::core::token_bucket::TokenBucket;

/// Owns one [`TokenBucket`] per client identifier.
#[derive(Debug)]
pub struct BucketRegistry {
    buckets: RwLock<HashMap<String, Arc<TokenBucket>>>,
    capacity: f64,
    refill_rate: f64,
}

impl BucketRegistry {
    /// Create a registry whose buckets hold `capacity` tokens and refill at
    /// `refill_rate` tokens per second.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            capacity,
            refill_rate,
        }
    }

    /// Build a registry admitting `max_requests` per `window` on average, with
    /// bursts of up to `max_requests`.
    pub fn from_quota(max_requests: u32, window: Duration) -> Self {
        let capacity = f64::from(max_requests);
        let refill_rate = capacity / window.as_secs_f64();

        tracing::info!(
            capacity,
            refill_rate,
            "Rate limiter initialized (max {} requests per {:?})",
            max_requests,
            window
        );

        Self::new(capacity, refill_rate)
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Decide whether `client_id` may proceed, consuming one of its tokens if so.
    pub fn allow(&self, client_id: &str) -> bool {
        self.bucket_for(client_id).allow()
    }

    /// Return the client's bucket, creating it if this is the first time the
    /// client has been seen.
    pub fn bucket_for(&self, client_id: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.read_buckets().get(client_id) {
            return bucket.clone();
        }

        let mut buckets = self
            .buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another caller may have inserted it between the two locks.
        buckets
            .entry(client_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(client = client_id, "Creating token bucket");
                Arc::new(TokenBucket::new(self.capacity, self.refill_rate))
            })
            .clone()
    }

    /// Number of clients currently holding a bucket.
    pub fn len(&self) -> usize {
        self.read_buckets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop buckets that have not been used for longer than `max_idle`.
    /// Returns how many were removed.
    ///
    /// A request racing with eviction may still consume from the evicted
    /// bucket; the client's next request starts a fresh, full bucket. Only the
    /// map entry is removed, so the one-bucket-per-client invariant holds for
    /// the map at all times.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        self.evict_idle_at(max_idle, Instant::now())
    }

    pub fn evict_idle_at(&self, max_idle: Duration, now: Instant) -> usize {
        let mut buckets = self
            .buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.idle_for(now) <= max_idle);
        let evicted = before - buckets.len();

        if evicted > 0 {
            tracing::debug!(evicted, remaining = buckets.len(), "Evicted idle buckets");
        }
        evicted
    }

    fn read_buckets(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<TokenBucket>>> {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner)
    }
}
