//! Continuous-refill token bucket for a single client key.
//!
//! Tokens accumulate proportionally to elapsed time (`refill_rate` per second)
//! up to `capacity`; each admitted request consumes one token. Unlike fixed
//! window counters there is no boundary at which a client can burst twice.
use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single rate-limiting bucket. All state lives behind one mutex so that
/// refill-then-consume is atomic for concurrent callers sharing the bucket.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket holding `capacity` tokens and refilling at
    /// `refill_rate` tokens per second.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self::new_at(capacity, refill_rate, Instant::now())
    }

    /// Same as [`TokenBucket::new`] with an explicit creation instant.
    pub fn new_at(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Try to take one token. Returns `false` when fewer than one token is
    /// available after refilling.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// [`TokenBucket::allow`] evaluated at `now`. An instant earlier than the
    /// last refill counts as zero elapsed time.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        self.refill(&mut state, now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current token count after refilling up to now.
    pub fn available_tokens(&self) -> f64 {
        self.available_tokens_at(Instant::now())
    }

    pub fn available_tokens_at(&self, now: Instant) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state, now);
        state.tokens
    }

    /// Time since the bucket was last touched.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.lock().last_refill)
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        // Never move the reference point backwards.
        if now > state.last_refill {
            state.last_refill = now;
        }
    }

    // State is consistent after every statement; a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
