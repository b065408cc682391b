//! Token bucket rate limiter.
//!
//! Tokens accrue at a fixed rate up to the bucket capacity; each upstream
//! call spends one. The bucket never sleeps itself: [`TokenBucket::try_take`]
//! reports how long the caller would have to wait, so the lock guarding the
//! bucket is never held across an await point.
//!
//! # Example
//!
//! ```rust
//! use ads_insight_client::rate_limit::TokenBucket;
//! use tokio::time::Instant;
//!
//! let now = Instant::now();
//! let mut bucket = TokenBucket::new(2, 1.0, now);
//!
//! assert!(bucket.try_take(now).is_ok());
//! assert!(bucket.try_take(now).is_ok());
//! // Bucket drained; the caller must wait about one second.
//! assert!(bucket.try_take(now).is_err());
//! ```

use std::time::Duration;

use tokio::time::Instant;

/// Token bucket refilling at a fixed rate.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Maximum tokens held
    capacity: f64,
    /// Tokens currently available
    tokens: f64,
    /// Tokens added per second
    refill_per_sec: f64,
    /// Last refill timestamp
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum burst size
    /// * `refill_per_sec` - Steady-state tokens per second
    /// * `now` - Current time
    pub fn new(capacity: u32, refill_per_sec: f64, now: Instant) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: refill_per_sec.max(f64::EPSILON),
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Try to take one token.
    ///
    /// Returns `Ok(())` if a token was taken, or `Err(wait_time)` with the
    /// time until one becomes available.
    pub fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }

    /// Give back a token taken for a call that was never made.
    pub fn refund(&mut self) {
        self.tokens = (self.tokens + 1.0).min(self.capacity);
    }

    /// Tokens available at `now`, without consuming any.
    pub fn available(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.refill_per_sec).min(self.capacity)
    }

    /// Refill to capacity.
    pub fn reset(&mut self, now: Instant) {
        self.tokens = self.capacity;
        self.last_refill = now;
    }
}
