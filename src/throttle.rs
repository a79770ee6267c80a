//! Throttling
//!
//! The shared adaptive rate limiter and the executor that routes every
//! remote call through it.

pub mod executor;
pub mod rate_limit;

// Re-exports
pub use executor::{ExecutorError, RequestExecutor, RetryDecision};
pub use rate_limit::{AdaptiveRateLimiter, RateLimitState};
