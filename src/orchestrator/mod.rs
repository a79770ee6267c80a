//! Job Orchestration
//!
//! ## Responsibility
//! Drive one render job through submit → poll → terminal, and cancel it on
//! request. Owns the [`RequestExecutor`] (and through it the shared
//! [`AdaptiveRateLimiter`]), the [`EtaEstimator`] and the credit ledger.
//!
//! ## Guarantees
//! - Every remote call goes through the executor. One throttle burst slows
//!   every job this orchestrator owns.
//! - Polling is bounded. `poll_until_terminal` always returns a job in a
//!   terminal status, never an error.
//! - A terminal status, once observed, is never replaced; a cancel racing a
//!   completed poll reports `AlreadyTerminal`.
//! - A cancel interrupts the poll sleep; it does not wait for the next tick.
//!
//! ## NOT Responsible For
//! - Presentation (see [`events`])
//! - Storing the rendered result
//! - Credit accounting beyond forwarding refunds to the [`CreditLedger`]

pub mod events;
pub mod job;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::{OrchestratorConfig, PollingConfig};
use crate::eta::EtaEstimator;
use crate::identity::compiler::{compile, tier_directive};
use crate::identity::IdentityProfile;
use crate::metrics;
use crate::service::{RemoteStatus, RenderService, StatusReport, SubmitRequest};
use crate::throttle::{AdaptiveRateLimiter, ExecutorError, RequestExecutor};
use crate::{CharacterDescriptor, SourceImage};

use events::{EventSink, JobEvent};
use job::{GenerationJob, JobFailure, JobHandle, JobStatus, JobUpdate, Transition};

/// Most source photos one job accepts.
pub const MAX_SOURCE_IMAGES: usize = 3;

/// Shortest poll interval `poll_until_terminal` will use.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ── Errors ───────────────────────────────────────────────────────────────

/// A job could not be started or cancelled.
///
/// Failures *after* submission are not errors: they end the job in
/// [`JobStatus::Failed`] with a [`JobFailure`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// Bad input, a rejection, or exhausted network retries at submit time.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// The call was still throttled after the last attempt.
    #[error("rate limit exceeded after {attempts} attempts, try again later")]
    RateLimitExceeded {
        /// Attempts made.
        attempts: u32,
    },

    /// The cancel request could not be delivered.
    #[error("cancel failed: {0}")]
    CancelFailed(String),
}

impl JobError {
    fn from_submit(err: ExecutorError) -> Self {
        match err {
            ExecutorError::RateLimitExceeded { attempts } => JobError::RateLimitExceeded { attempts },
            other => JobError::SubmissionFailed(other.to_string()),
        }
    }

    fn from_cancel(err: ExecutorError) -> Self {
        match err {
            ExecutorError::RateLimitExceeded { attempts } => JobError::RateLimitExceeded { attempts },
            other => JobError::CancelFailed(other.to_string()),
        }
    }
}

impl From<ExecutorError> for JobFailure {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::RateLimitExceeded { attempts } => JobFailure::RateLimitExceeded { attempts },
            ExecutorError::Network { message, .. } => JobFailure::Network(message),
            ExecutorError::Rejected(message) => JobFailure::GenerationFailed(message),
        }
    }
}

/// Result of [`Orchestrator::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job is now cancelled.
    Cancelled {
        /// Credits the service refunded (zero outside the refund window).
        refund_credits: u32,
    },
    /// The job had already reached this terminal status; nothing changed.
    AlreadyTerminal(JobStatus),
}

// ── Credit ledger ────────────────────────────────────────────────────────

/// Destination for refunded credits.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Return `credits` to the user who owned `job_id`.
    async fn refund(
        &self,
        job_id: &str,
        credits: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Ledger that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLedger;

#[async_trait]
impl CreditLedger for NoopLedger {
    async fn refund(
        &self,
        job_id: &str,
        credits: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        debug!(job_id, credits, "ledger: refund ignored");
        Ok(())
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Submits, polls and cancels render jobs.
pub struct Orchestrator {
    service: Arc<dyn RenderService>,
    executor: RequestExecutor,
    estimator: EtaEstimator,
    polling: PollingConfig,
    ledger: Arc<dyn CreditLedger>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("executor", &self.executor)
            .field("estimator", &self.estimator)
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build an orchestrator with its own limiter.
    pub fn new(service: Arc<dyn RenderService>, config: &OrchestratorConfig) -> Self {
        let limiter = Arc::new(AdaptiveRateLimiter::new(config.rate_limit.clone()));
        Self::with_limiter(service, limiter, config)
    }

    /// Build an orchestrator sharing an existing limiter.
    ///
    /// Use this when several orchestrators talk to the same service account.
    pub fn with_limiter(
        service: Arc<dyn RenderService>,
        limiter: Arc<AdaptiveRateLimiter>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            service,
            executor: RequestExecutor::new(limiter, config.rate_limit.max_retries),
            estimator: EtaEstimator::new(config.estimator.clone()),
            polling: config.polling.clone(),
            ledger: Arc::new(NoopLedger),
        }
    }

    /// Replace the credit ledger.
    pub fn with_ledger(mut self, ledger: Arc<dyn CreditLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// The shared limiter.
    pub fn limiter(&self) -> &Arc<AdaptiveRateLimiter> {
        self.executor.limiter()
    }

    /// The ETA estimator.
    pub fn estimator(&self) -> &EtaEstimator {
        &self.estimator
    }

    /// Submit a job.
    ///
    /// Validates the input locally, compiles the identity lock for the
    /// character's tier and sends one submission through the executor. On
    /// success the job is `Queued` (or `Processing` when nothing is ahead)
    /// and a [`JobEvent::Submitted`] carries the initial ETA.
    ///
    /// # Errors
    ///
    /// - [`JobError::SubmissionFailed`] for bad input, a rejection, or
    ///   exhausted network retries
    /// - [`JobError::RateLimitExceeded`] when every attempt was throttled
    pub async fn submit(
        &self,
        images: Vec<SourceImage>,
        character: CharacterDescriptor,
        profile: Option<IdentityProfile>,
        sink: &EventSink,
    ) -> Result<JobHandle, JobError> {
        if images.is_empty() || images.len() > MAX_SOURCE_IMAGES {
            return Err(JobError::SubmissionFailed(format!(
                "expected 1 to {MAX_SOURCE_IMAGES} images, got {}",
                images.len()
            )));
        }
        if character.name.trim().is_empty() {
            return Err(JobError::SubmissionFailed("character name is required".into()));
        }

        let tier = character.tier;
        let lock = compile(profile.as_ref(), tier);
        let request = SubmitRequest {
            image: images[0].clone(),
            reference_images: images[1..].to_vec(),
            character: character.clone(),
            identity_lock: lock.into_string(),
            style_directive: tier_directive(tier, &character.name, &character.source),
        };

        let handle = JobHandle::new(GenerationJob::new(images, character, profile));

        let ack = match self
            .executor
            .execute("submit", || self.service.submit(&request), sink)
            .await
        {
            Ok(ack) => ack,
            Err(err) => {
                warn!(character = %request.character.name, error = %err, "submit failed");
                metrics::inc_job_outcome("submission_failed");
                return Err(JobError::from_submit(err));
            }
        };

        let queue_position = match ack.status {
            RemoteStatus::Queued => ack.queue_position.unwrap_or(0),
            // a job already finished still needs one poll for its result
            RemoteStatus::Processing | RemoteStatus::Completed => 0,
            RemoteStatus::Failed | RemoteStatus::Cancelled => {
                warn!(job_id = %ack.job_id, status = ack.status.as_str(), "submit acknowledged a dead job");
                metrics::inc_job_outcome("submission_failed");
                return Err(JobError::SubmissionFailed(format!(
                    "service reported job {} as {} on submission",
                    ack.job_id,
                    ack.status.as_str()
                )));
            }
        };
        let eta = self.estimator.estimate_duration(tier, queue_position);
        handle.apply(JobUpdate::Acknowledged {
            job_id: ack.job_id.clone(),
            queue_position,
            eta,
        });

        info!(
            job_id = %ack.job_id,
            tier = %tier,
            queue_position,
            eta_s = eta.as_secs(),
            "job submitted"
        );
        sink.emit(JobEvent::Submitted {
            job_id: ack.job_id,
            queue_position,
            eta,
        });

        Ok(handle)
    }

    /// Poll until the job is terminal or `max_wait` runs out.
    ///
    /// Each tick sleeps `poll_interval` first, then polls once through the
    /// executor. A tick starting exactly at the deadline still polls; one
    /// starting after it ends the job with [`JobFailure::Timeout`], as does
    /// a poll (including its backoff waits) still running at the deadline.
    /// Exhausted retries end the job `Failed` with the executor's reason.
    /// A cancel landing during the sleep ends the loop immediately.
    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    pub async fn poll_until_terminal(
        &self,
        handle: &JobHandle,
        sink: &EventSink,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> GenerationJob {
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let started = Instant::now();
        let deadline = started + max_wait;
        let job_id = handle.id();
        let mut status_rx = handle.subscribe();
        let mut polls: u32 = 0;

        debug!(
            job_id = %job_id,
            max_wait_ms = max_wait.as_millis() as u64,
            interval_ms = poll_interval.as_millis() as u64,
            "polling started"
        );

        while !handle.status().is_terminal() {
            sleep_or_terminal(&mut status_rx, Instant::now() + poll_interval).await;
            if handle.status().is_terminal() {
                break;
            }
            if Instant::now() > deadline {
                handle.apply(JobUpdate::Failed(JobFailure::Timeout));
                break;
            }

            polls += 1;
            metrics::inc_poll_tick();
            let call = self
                .executor
                .execute("status", || self.service.status(&job_id), sink);

            match timeout_at(deadline, call).await {
                Err(_) => {
                    handle.apply(JobUpdate::Failed(JobFailure::Timeout));
                }
                Ok(Err(err)) => {
                    handle.apply(JobUpdate::Failed(JobFailure::from(err)));
                }
                Ok(Ok(report)) => {
                    let message = report
                        .message
                        .clone()
                        .unwrap_or_else(|| default_message(&report));
                    handle.apply(JobUpdate::Reported(report));
                    let job = handle.snapshot();
                    debug!(
                        job_id = %job_id,
                        status = job.status().as_str(),
                        queue_position = job.queue_position(),
                        "poll"
                    );
                    sink.emit(JobEvent::Progress {
                        job_id: job_id.clone(),
                        status: job.status(),
                        queue_position: job.queue_position(),
                        message,
                        elapsed: started.elapsed(),
                    });
                }
            }
        }

        let job = handle.snapshot();
        metrics::inc_job_outcome(job.status().as_str());
        match job.failure() {
            Some(failure) => warn!(
                job_id = %job_id,
                polls,
                reason = failure.label(),
                error = %failure,
                "job failed"
            ),
            None => info!(
                job_id = %job_id,
                polls,
                status = job.status().as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job finished"
            ),
        }
        job
    }

    /// Cancel a job.
    ///
    /// Already-terminal jobs are left alone. Otherwise one cancel request
    /// goes through the executor; a confirmed cancellation moves the job to
    /// `Cancelled`, records the refund and forwards a non-zero refund to the
    /// ledger. If the service (or a concurrent poll) shows the job finished
    /// first, that status stands and `AlreadyTerminal` is returned.
    ///
    /// # Errors
    ///
    /// - [`JobError::RateLimitExceeded`] when every attempt was throttled
    /// - [`JobError::CancelFailed`] for rejections and network exhaustion
    pub async fn cancel(
        &self,
        handle: &JobHandle,
        sink: &EventSink,
    ) -> Result<CancelOutcome, JobError> {
        let current = handle.status();
        if current.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(current));
        }
        let job_id = handle.id();
        if job_id.is_empty() {
            return Err(JobError::CancelFailed("job was never acknowledged".into()));
        }

        let receipt = self
            .executor
            .execute("cancel", || self.service.cancel(&job_id), sink)
            .await
            .map_err(JobError::from_cancel)?;

        if let Some(status @ (RemoteStatus::Completed | RemoteStatus::Failed)) = receipt.status {
            // Finished before the cancel landed. Record it unless a poll
            // already did.
            let mut report = StatusReport {
                status,
                result_url: receipt.result_url,
                message: receipt.message,
                queue_position: None,
            };
            if status == RemoteStatus::Completed && report.result_url.is_none() {
                report = self.finished_report(&job_id, report, sink).await;
            }
            handle.apply(JobUpdate::Reported(report));
            let final_status = handle.status();
            info!(job_id = %job_id, status = final_status.as_str(), "cancel: job already finished");
            return Ok(CancelOutcome::AlreadyTerminal(final_status));
        }

        let refund_credits = receipt.refund_credits;
        if let Transition::IgnoredTerminal { current } =
            handle.apply(JobUpdate::CancelConfirmed { refund_credits })
        {
            info!(job_id = %job_id, status = current.as_str(), "cancel: lost race to a terminal poll");
            return Ok(CancelOutcome::AlreadyTerminal(current));
        }

        info!(job_id = %job_id, refund_credits, "job cancelled");
        if refund_credits > 0 {
            if let Err(e) = self.ledger.refund(&job_id, refund_credits).await {
                warn!(job_id = %job_id, refund_credits, error = %e, "ledger refund failed");
            }
        }

        Ok(CancelOutcome::Cancelled { refund_credits })
    }

    /// One status fetch for a job the service says completed, so the
    /// result location is not lost. Falls back to `receipt` on any failure.
    async fn finished_report(
        &self,
        job_id: &str,
        receipt: StatusReport,
        sink: &EventSink,
    ) -> StatusReport {
        match self
            .executor
            .execute("status", || self.service.status(job_id), sink)
            .await
        {
            Ok(report) if report.status == RemoteStatus::Completed => report,
            Ok(report) => {
                warn!(job_id, status = report.status.as_str(), "cancel: status disagrees with receipt");
                receipt
            }
            Err(err) => {
                warn!(job_id, error = %err, "cancel: could not fetch the finished render");
                receipt
            }
        }
    }

    /// Submit, then poll with the configured interval and bounded wait.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit). Once submitted, the job always
    /// comes back terminal.
    pub async fn run(
        &self,
        images: Vec<SourceImage>,
        character: CharacterDescriptor,
        profile: Option<IdentityProfile>,
        sink: &EventSink,
    ) -> Result<GenerationJob, JobError> {
        let handle = self.submit(images, character, profile, sink).await?;
        Ok(self
            .poll_until_terminal(&handle, sink, self.polling.max_wait(), self.polling.interval())
            .await)
    }
}

/// Sleep until `wake_at`, returning early if the job turns terminal.
async fn sleep_or_terminal(status_rx: &mut watch::Receiver<JobStatus>, wake_at: Instant) {
    loop {
        tokio::select! {
            _ = sleep_until(wake_at) => return,
            changed = status_rx.changed() => {
                if changed.is_err() {
                    sleep_until(wake_at).await;
                    return;
                }
                if status_rx.borrow_and_update().is_terminal() {
                    return;
                }
            }
        }
    }
}

fn default_message(report: &StatusReport) -> String {
    match report.status {
        RemoteStatus::Queued => match report.queue_position {
            Some(n) => format!("{n} jobs ahead"),
            None => "Queued".to_string(),
        },
        RemoteStatus::Processing => "Rendering".to_string(),
        RemoteStatus::Completed => "Render complete".to_string(),
        RemoteStatus::Failed => "Render failed".to_string(),
        RemoteStatus::Cancelled => "Cancelled".to_string(),
    }
}
