//! Request Execution
//!
//! Wraps a single remote call with the shared limiter's backoff protocol and
//! a bounded attempt budget. Submit, status and cancel all go through
//! [`RequestExecutor::execute`] unchanged, so backoff state is shared
//! correctly across the whole client.
//!
//! The retry loop is split in two:
//! - [`decide`]: a pure transition from (attempt, outcome) to a
//!   [`RetryDecision`], testable without timers
//! - [`RequestExecutor::execute`]: applies the decision: limiter updates,
//!   retry events, and the async wait
//!
//! ## Usage
//!
//! ```rust,ignore
//! let executor = RequestExecutor::new(limiter, 5);
//! let ack = executor
//!     .execute("submit", || service.submit(&request), &sink)
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::rate_limit::AdaptiveRateLimiter;
use crate::metrics;
use crate::orchestrator::events::{EventSink, JobEvent};
use crate::service::CallOutcome;

/// Why the executor gave up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    /// Every attempt was used and the last one was throttled.
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded {
        /// Attempts made.
        attempts: u32,
    },

    /// Every attempt was used and the last one failed at the network level.
    #[error("network failure after {attempts} attempts: {message}")]
    Network {
        /// Attempts made.
        attempts: u32,
        /// Last transport error.
        message: String,
    },

    /// The service answered with a non-retryable rejection.
    #[error("rejected by service: {0}")]
    Rejected(String),
}

/// Next step after one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the value back to the caller.
    Succeed,
    /// Back off and try again.
    Retry,
    /// Stop with this error.
    Fail(ExecutorError),
}

/// Transition function of the retry loop.
///
/// `attempt` is 1-based. Retryable outcomes become `Retry` until
/// `attempt == max_attempts`, after which they become `Fail`.
pub fn decide<T>(attempt: u32, max_attempts: u32, outcome: &CallOutcome<T>) -> RetryDecision {
    let exhausted = attempt >= max_attempts;
    match outcome {
        CallOutcome::Success(_) => RetryDecision::Succeed,
        CallOutcome::Rejected(message) => {
            RetryDecision::Fail(ExecutorError::Rejected(message.clone()))
        }
        CallOutcome::Throttled if exhausted => {
            RetryDecision::Fail(ExecutorError::RateLimitExceeded { attempts: attempt })
        }
        CallOutcome::NetworkFailure(message) if exhausted => {
            RetryDecision::Fail(ExecutorError::Network {
                attempts: attempt,
                message: message.clone(),
            })
        }
        CallOutcome::Throttled | CallOutcome::NetworkFailure(_) => RetryDecision::Retry,
    }
}

/// Runs remote calls under the shared [`AdaptiveRateLimiter`].
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    limiter: Arc<AdaptiveRateLimiter>,
    max_attempts: u32,
}

impl RequestExecutor {
    /// Create an executor allowing `max_attempts` attempts per call
    /// (values below 1 are treated as 1).
    pub fn new(limiter: Arc<AdaptiveRateLimiter>, max_attempts: u32) -> Self {
        Self {
            limiter,
            max_attempts: max_attempts.max(1),
        }
    }

    /// The limiter this executor reports to.
    pub fn limiter(&self) -> &Arc<AdaptiveRateLimiter> {
        &self.limiter
    }

    /// Attempts allowed per call.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Perform `call` until it succeeds, is rejected, or the attempt budget
    /// runs out.
    ///
    /// Throttled and network failures both feed the limiter. Between
    /// attempts a [`JobEvent::Retrying`] is emitted followed by one
    /// [`JobEvent::Countdown`] per limiter tick. No wait follows the final
    /// attempt.
    ///
    /// `operation` labels logs and metrics only.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when retries are exhausted or the service
    /// rejects the call.
    pub async fn execute<F, Fut, T>(
        &self,
        operation: &'static str,
        mut call: F,
        sink: &EventSink,
    ) -> Result<T, ExecutorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(operation, attempt, max = self.max_attempts, "executor: attempting call");

            let outcome = call().await;
            metrics::inc_remote_call(operation, outcome.label());

            match &outcome {
                CallOutcome::Success(_) => self.limiter.record_success(),
                CallOutcome::Throttled => {
                    self.limiter.record_throttled();
                }
                CallOutcome::NetworkFailure(message) => {
                    warn!(operation, attempt, error = %message, "executor: network failure");
                    self.limiter.record_throttled();
                }
                CallOutcome::Rejected(message) => {
                    warn!(operation, attempt, reason = %message, "executor: rejected");
                }
            }

            match (decide(attempt, self.max_attempts, &outcome), outcome) {
                (RetryDecision::Succeed, CallOutcome::Success(value)) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "executor: succeeded after retries");
                    }
                    return Ok(value);
                }
                (RetryDecision::Fail(err), _) => {
                    warn!(operation, attempts = attempt, error = %err, "executor: giving up");
                    return Err(err);
                }
                _ => {}
            }

            let delay = self.limiter.current_delay();
            sink.emit(JobEvent::Retrying { attempt, delay });
            self.limiter
                .wait(|remaining| sink.emit(JobEvent::Countdown { remaining }))
                .await;
        }
    }
}
