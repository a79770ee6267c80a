//! Adaptive Rate Limiting
//!
//! One cooldown delay and one error streak for the whole client, because the
//! render service enforces a single throttling budget per client rather than
//! per job.
//!
//! The delay grows linearly and saturates:
//!
//! ```text
//! success   → delay = base
//! throttled → delay = min(delay + increment, max)
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use render_orchestrator::config::RateLimitConfig;
//! use render_orchestrator::AdaptiveRateLimiter;
//! # #[tokio::main]
//! # async fn main() {
//! let limiter = AdaptiveRateLimiter::new(RateLimitConfig::default());
//! limiter.record_throttled();
//! limiter.wait(|remaining| println!("retrying in {}s", remaining.as_secs())).await;
//! # }
//! ```

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::metrics;

/// Snapshot of the limiter's mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    /// Active cooldown in milliseconds. Always within `[base, max]`.
    pub current_delay_ms: u64,
    /// Throttle/network failures since the last success.
    pub consecutive_errors: u32,
}

/// Shared linear backoff controller.
///
/// Cheap to share behind an `Arc`; all mutation happens under a short
/// `parking_lot` lock and never across an `.await`.
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    state: Mutex<RateLimitState>,
    base_delay: u64,
    increment: u64,
    max_delay: u64,
    tick: Duration,
}

impl AdaptiveRateLimiter {
    /// Create a limiter starting at the base delay.
    ///
    /// A `base_delay_ms` above `max_delay_ms` is clamped down so the
    /// `base ≤ delay ≤ max` invariant always holds.
    pub fn new(config: RateLimitConfig) -> Self {
        let max_delay = config.max_delay_ms;
        let base_delay = config.base_delay_ms.min(max_delay);
        metrics::set_backoff_delay(base_delay);
        Self {
            state: Mutex::new(RateLimitState {
                current_delay_ms: base_delay,
                consecutive_errors: 0,
            }),
            base_delay,
            increment: config.delay_increment_ms,
            max_delay,
            tick: Duration::from_millis(config.tick_interval_ms.max(1)),
        }
    }

    /// A call succeeded: reset to the base delay and clear the error streak.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.consecutive_errors > 0 {
            debug!(
                previous_delay_ms = state.current_delay_ms,
                errors = state.consecutive_errors,
                "rate limit: recovered, delay reset"
            );
        }
        state.current_delay_ms = self.base_delay;
        state.consecutive_errors = 0;
        metrics::set_backoff_delay(self.base_delay);
    }

    /// A call was throttled (or failed at the network level): add one
    /// increment, saturating at the maximum.
    pub fn record_throttled(&self) {
        let mut state = self.state.lock();
        state.consecutive_errors = state.consecutive_errors.saturating_add(1);
        state.current_delay_ms = state
            .current_delay_ms
            .saturating_add(self.increment)
            .min(self.max_delay);
        warn!(
            delay_ms = state.current_delay_ms,
            errors = state.consecutive_errors,
            "rate limit: backing off"
        );
        metrics::inc_throttle_event();
        metrics::set_backoff_delay(state.current_delay_ms);
    }

    /// Active cooldown delay.
    pub fn current_delay(&self) -> Duration {
        Duration::from_millis(self.state.lock().current_delay_ms)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> RateLimitState {
        *self.state.lock()
    }

    /// Sleep for the current delay, calling `on_tick(remaining)` at the tick
    /// cadence so callers can show a countdown.
    ///
    /// The delay is read once on entry. Returns immediately when it is zero.
    /// Waiting never counts as a success or a failure.
    pub async fn wait<F>(&self, mut on_tick: F)
    where
        F: FnMut(Duration),
    {
        let mut remaining = self.current_delay();
        if remaining.is_zero() {
            return;
        }

        debug!(delay_ms = remaining.as_millis() as u64, "rate limit: waiting");
        while !remaining.is_zero() {
            on_tick(remaining);
            let step = remaining.min(self.tick);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
    }
}

impl Default for AdaptiveRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> AdaptiveRateLimiter {
        AdaptiveRateLimiter::default()
    }

    #[test]
    fn test_starts_at_base_delay() {
        let l = limiter();
        assert_eq!(l.current_delay(), Duration::from_millis(80_000));
        assert_eq!(l.snapshot().consecutive_errors, 0);
    }

    #[test]
    fn test_three_throttles_step_linearly() {
        let l = limiter();
        let mut seen = vec![l.current_delay().as_millis()];
        for _ in 0..2 {
            l.record_throttled();
            seen.push(l.current_delay().as_millis());
        }
        assert_eq!(seen, vec![80_000, 120_000, 160_000]);
        l.record_throttled();
        assert_eq!(l.current_delay(), Duration::from_millis(200_000));
        assert_eq!(l.snapshot().consecutive_errors, 3);
    }

    #[test]
    fn test_throttle_sequence_is_monotonic_and_saturates() {
        let l = limiter();
        let mut previous = l.current_delay();
        for _ in 0..50 {
            l.record_throttled();
            let now = l.current_delay();
            assert!(now >= previous, "delay must never decrease");
            assert!(now <= Duration::from_millis(300_000), "delay must saturate");
            previous = now;
        }
        assert_eq!(previous, Duration::from_millis(300_000));
    }

    #[test]
    fn test_single_success_resets_from_any_state() {
        let l = limiter();
        for _ in 0..10 {
            l.record_throttled();
        }
        l.record_success();
        assert_eq!(
            l.snapshot(),
            RateLimitState {
                current_delay_ms: 80_000,
                consecutive_errors: 0
            }
        );
    }

    #[test]
    fn test_base_above_max_is_clamped() {
        let l = AdaptiveRateLimiter::new(RateLimitConfig {
            base_delay_ms: 10_000,
            max_delay_ms: 5_000,
            ..RateLimitConfig::default()
        });
        assert_eq!(l.current_delay(), Duration::from_millis(5_000));
        l.record_throttled();
        assert_eq!(l.current_delay(), Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ticks_once_per_second() {
        let l = AdaptiveRateLimiter::new(RateLimitConfig {
            base_delay_ms: 3_000,
            ..RateLimitConfig::default()
        });
        let start = tokio::time::Instant::now();
        let mut ticks = Vec::new();
        l.wait(|remaining| ticks.push(remaining.as_millis() as u64)).await;

        assert_eq!(ticks, vec![3_000, 2_000, 1_000]);
        assert_eq!(start.elapsed(), Duration::from_millis(3_000));
        // waiting is neutral
        assert_eq!(l.snapshot().consecutive_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_with_partial_last_tick() {
        let l = AdaptiveRateLimiter::new(RateLimitConfig {
            base_delay_ms: 2_500,
            ..RateLimitConfig::default()
        });
        let start = tokio::time::Instant::now();
        let mut ticks = 0;
        l.wait(|_| ticks += 1).await;
        assert_eq!(ticks, 3);
        assert_eq!(start.elapsed(), Duration::from_millis(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_immediately_on_zero_delay() {
        let l = AdaptiveRateLimiter::new(RateLimitConfig {
            base_delay_ms: 0,
            ..RateLimitConfig::default()
        });
        let start = tokio::time::Instant::now();
        let mut ticks = 0;
        l.wait(|_| ticks += 1).await;
        assert_eq!(ticks, 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
