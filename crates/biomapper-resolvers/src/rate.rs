// biomapper-resolvers/src/rate.rs
// ============================================================================
// Module: Resolver Rate Limiting
// Description: Token-bucket limiter for outbound resolver calls.
// Purpose: Keep batch pipelines inside per-resolver request budgets.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A simple token bucket: capacity tokens, refilled continuously at the
//! configured per-second rate. Acquisition never blocks; a drained bucket
//! surfaces as a rate-limit failure that the step's `on_error` policy may
//! retry with backoff.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::Instant;

// ============================================================================
// SECTION: Token Bucket
// ============================================================================

/// Token bucket state.
struct BucketState {
    /// Tokens currently available.
    tokens: f64,
    /// Last refill instant.
    refilled_at: Instant,
}

/// Continuous-refill token bucket.
pub struct TokenBucket {
    /// Maximum token count.
    capacity: f64,
    /// Tokens added per second.
    refill_per_sec: f64,
    /// Guarded bucket state.
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket refilling at `per_sec` tokens per second.
    #[must_use]
    pub fn new(per_sec: u32) -> Self {
        let capacity = f64::from(per_sec.max(1));
        Self {
            capacity,
            refill_per_sec: capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Attempts to take one token.
    ///
    /// Returns false when the bucket is empty; the caller maps that to a
    /// rate-limit failure.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let now = Instant::now();
        let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.refilled_at = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Returns the suggested wait until one token is available, in
    /// milliseconds.
    #[must_use]
    pub fn retry_after_ms(&self) -> u64 {
        let Ok(state) = self.state.lock() else {
            return 1_000;
        };
        if state.tokens >= 1.0 {
            return 0;
        }
        let missing = 1.0 - state.tokens;
        let seconds = missing / self.refill_per_sec;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "bounded")]
        {
            (seconds * 1_000.0).ceil() as u64
        }
    }
}
