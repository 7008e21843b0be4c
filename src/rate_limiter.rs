//! Global call-rate limiting across concurrent workers
//!
//! A [`RateLimiter`] hands out start slots spaced at least `1/qps` apart. One
//! limiter is created per pass and shared by reference with every worker in
//! that pass.

use rand::Rng;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Slowest supported cadence; rates below one call per hour are clamped to it
const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Default upper bound for the random delay added after a slot wait
pub const DEFAULT_JITTER: Duration = Duration::from_millis(150);

/// Reservation-based limiter admitting at most `qps` call starts per second
///
/// # Algorithm
///
/// - `next_slot` is the earliest instant the next call may start
/// - `reserve` takes `max(next_slot, now)` as the caller's slot and advances
///   `next_slot` by one interval while holding the lock
/// - `acquire` sleeps until the reserved slot, then adds a small random jitter
///   so callers released together do not hit the source in lockstep
///
/// Admission order follows reservation order. Jitter only ever delays a caller
/// past its slot, so the spacing between slots is never shortened.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between call starts (None = unlimited)
    interval: Option<Duration>,
    /// Upper bound for post-wait jitter
    jitter: Duration,
    /// Earliest start of the next call; None until the first reservation
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter for `qps` calls per second
    ///
    /// A rate that is zero, negative or not finite disables limiting.
    ///
    /// # Examples
    ///
    /// ```
    /// use netuid_fetch::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// let limiter = RateLimiter::new(4.0);
    /// assert_eq!(limiter.interval(), Some(Duration::from_millis(250)));
    ///
    /// let unlimited = RateLimiter::new(0.0);
    /// assert!(!unlimited.is_limited());
    /// ```
    #[must_use]
    pub fn new(qps: f64) -> Self {
        let interval = if qps.is_finite() && qps > 0.0 {
            Some(
                Duration::try_from_secs_f64(1.0 / qps)
                    .map_or(MAX_INTERVAL, |d| d.min(MAX_INTERVAL)),
            )
        } else {
            None
        };

        Self {
            interval,
            jitter: DEFAULT_JITTER,
            next_slot: Mutex::new(None),
        }
    }

    /// Create a limiter that never waits
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    /// Replace the post-wait jitter bound (zero disables jitter)
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Minimum spacing between call starts, or None if unlimited
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Whether this limiter ever makes callers wait
    pub fn is_limited(&self) -> bool {
        self.interval.is_some()
    }

    /// Reserve the next start slot and return how long the caller must wait for it
    ///
    /// The cursor only moves forward. Callers that arrive after an idle gap
    /// get `now` as their slot and do not wait.
    pub fn reserve(&self) -> Duration {
        let Some(interval) = self.interval else {
            return Duration::ZERO;
        };

        let now = Instant::now();
        let mut next_slot = self
            .next_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let slot = match *next_slot {
            Some(next) if next > now => next,
            _ => now,
        };
        *next_slot = Some(slot + interval);

        slot - now
    }

    /// Wait for this caller's turn to start an external call
    ///
    /// Returns immediately for an unlimited limiter or when the caller's slot
    /// has already arrived.
    ///
    /// ```no_run
    /// use netuid_fetch::rate_limiter::RateLimiter;
    ///
    /// # async fn example() {
    /// let limiter = RateLimiter::new(3.0);
    /// limiter.acquire().await;
    /// // ... start the external call ...
    /// # }
    /// ```
    pub async fn acquire(&self) {
        let wait = self.reserve();
        if wait.is_zero() {
            return;
        }

        tokio::time::sleep(wait + self.random_jitter()).await;
    }

    fn random_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let secs = rand::thread_rng().gen_range(0.0..=self.jitter.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_interval_from_qps() {
        assert_eq!(
            RateLimiter::new(2.0).interval(),
            Some(Duration::from_millis(500))
        );
        assert_eq!(RateLimiter::new(1.0).interval(), Some(Duration::from_secs(1)));
        assert_eq!(RateLimiter::new(1e-9).interval(), Some(MAX_INTERVAL));
    }

    #[test]
    fn test_non_positive_rate_is_unlimited() {
        for qps in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let limiter = RateLimiter::new(qps);
            assert!(!limiter.is_limited(), "qps {} should be unlimited", qps);
            assert_eq!(limiter.reserve(), Duration::ZERO);
            assert_eq!(limiter.reserve(), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reservations_are_spaced_by_interval() {
        let limiter = RateLimiter::new(4.0);

        assert_eq!(limiter.reserve(), Duration::ZERO);
        assert_eq!(limiter.reserve(), Duration::from_millis(250));
        assert_eq!(limiter.reserve(), Duration::from_millis(500));
        assert_eq!(limiter.reserve(), Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_gap_does_not_bank_slots() {
        let limiter = RateLimiter::new(2.0);
        assert_eq!(limiter.reserve(), Duration::ZERO);

        tokio::time::advance(Duration::from_secs(10)).await;

        // The cursor is in the past, so the next caller starts now and the one
        // after it still waits a full interval.
        assert_eq!(limiter.reserve(), Duration::ZERO);
        assert_eq!(limiter.reserve(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_acquire_does_not_wait() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_respect_cadence() {
        let limiter = Arc::new(RateLimiter::new(5.0).with_jitter(Duration::ZERO));
        let interval = Duration::from_millis(200);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap());
        }
        starts.sort();

        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= interval, "calls started {:?} apart", gap);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_only_delays_past_slot() {
        let jitter = Duration::from_millis(150);
        let limiter = RateLimiter::new(1.0).with_jitter(jitter);

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO, "first slot is immediate");

        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        // Timer resolution is one millisecond
        assert!(elapsed <= Duration::from_secs(1) + jitter + Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_disabled() {
        let limiter = RateLimiter::new(10.0).with_jitter(Duration::ZERO);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(205));
    }
}
