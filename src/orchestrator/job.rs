//! Generation job state machine.
//!
//! ```text
//! Submitting ──ack(q>0)──▶ Queued ──q=0──▶ Processing ──▶ Completed
//!      └──────ack(q=0)──────────────────────▲     ├──▶ Failed
//!                                                 └──▶ Cancelled
//! ```
//!
//! All mutation goes through [`GenerationJob::apply`]. The one invariant it
//! enforces: **a terminal status is final**. Whichever terminal observation
//! lands first wins, and later updates (a cancel confirmation racing a
//! completed poll, a late timeout) come back as
//! [`Transition::IgnoredTerminal`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::identity::IdentityProfile;
use crate::service::{RemoteStatus, StatusReport};
use crate::{CharacterDescriptor, SourceImage};

/// Local lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Sent, not yet acknowledged.
    Submitting,
    /// Waiting in the remote queue.
    Queued,
    /// Being rendered.
    Processing,
    /// Render available.
    Completed,
    /// Ended without a render; see [`JobFailure`].
    Failed,
    /// Cancelled by the user.
    Cancelled,
}

impl JobStatus {
    /// Completed, Failed or Cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Lower-case label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitting => "submitting",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// Why a job ended in [`JobStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum JobFailure {
    /// The local deadline passed with no terminal status from the service.
    #[error("timed out waiting for the render")]
    Timeout,

    /// The service reported the render as failed.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// Status polling ran out of attempts while throttled.
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded {
        /// Attempts made on the final tick.
        attempts: u32,
    },

    /// Status polling ran out of attempts on network failures.
    #[error("network failure: {0}")]
    Network(String),
}

impl JobFailure {
    /// Whether the caller should offer an immediate retry.
    ///
    /// `RateLimitExceeded` asks the user to come back later instead.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, JobFailure::RateLimitExceeded { .. })
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            JobFailure::Timeout => "timeout",
            JobFailure::GenerationFailed(_) => "generation_failed",
            JobFailure::RateLimitExceeded { .. } => "rate_limit_exceeded",
            JobFailure::Network(_) => "network",
        }
    }
}

/// Input to [`GenerationJob::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// The service accepted the submission.
    Acknowledged {
        /// Id assigned by the service.
        job_id: String,
        /// Jobs ahead at submission.
        queue_position: u32,
        /// Initial ETA for display.
        eta: Duration,
    },
    /// A status poll (or a cancel receipt) reported the remote status.
    Reported(StatusReport),
    /// The service confirmed a cancellation.
    CancelConfirmed {
        /// Credits refunded by the service.
        refund_credits: u32,
    },
    /// The client gave up (deadline or exhausted retries).
    Failed(JobFailure),
}

/// Result of applying an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status moved.
    Changed {
        /// Status before.
        from: JobStatus,
        /// Status after.
        to: JobStatus,
    },
    /// Attributes may have changed; status did not.
    Unchanged,
    /// The job was already terminal; the update was discarded.
    IgnoredTerminal {
        /// The final status that was kept.
        current: JobStatus,
    },
}

/// One render job as seen by the client.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    id: String,
    status: JobStatus,
    submitted_at: DateTime<Utc>,
    images: Vec<SourceImage>,
    character: CharacterDescriptor,
    profile: Option<IdentityProfile>,
    queue_position: u32,
    eta: Duration,
    result_url: Option<String>,
    failure: Option<JobFailure>,
    refund_credits: Option<u32>,
    message: Option<String>,
}

impl GenerationJob {
    /// A job in `Submitting`, stamped now.
    pub fn new(
        images: Vec<SourceImage>,
        character: CharacterDescriptor,
        profile: Option<IdentityProfile>,
    ) -> Self {
        Self {
            id: String::new(),
            status: JobStatus::Submitting,
            submitted_at: Utc::now(),
            images,
            character,
            profile,
            queue_position: 0,
            eta: Duration::ZERO,
            result_url: None,
            failure: None,
            refund_credits: None,
            message: None,
        }
    }

    /// Remote id (empty until acknowledged).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Wall-clock submission time.
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Source photos.
    pub fn images(&self) -> &[SourceImage] {
        &self.images
    }

    /// Target character.
    pub fn character(&self) -> &CharacterDescriptor {
        &self.character
    }

    /// Identity profile used for the lock, if any.
    pub fn profile(&self) -> Option<&IdentityProfile> {
        self.profile.as_ref()
    }

    /// Last known queue position.
    pub fn queue_position(&self) -> u32 {
        self.queue_position
    }

    /// ETA reported at submission.
    pub fn eta(&self) -> Duration {
        self.eta
    }

    /// Render location once completed.
    pub fn result_url(&self) -> Option<&str> {
        self.result_url.as_deref()
    }

    /// Failure reason once failed.
    pub fn failure(&self) -> Option<&JobFailure> {
        self.failure.as_ref()
    }

    /// Refund granted by the service once cancelled.
    pub fn refund_credits(&self) -> Option<u32> {
        self.refund_credits
    }

    /// Last message from the service.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The single transition function.
    pub fn apply(&mut self, update: JobUpdate) -> Transition {
        if self.status.is_terminal() {
            return Transition::IgnoredTerminal {
                current: self.status,
            };
        }

        let from = self.status;
        let to = match update {
            JobUpdate::Acknowledged {
                job_id,
                queue_position,
                eta,
            } => {
                self.id = job_id;
                self.queue_position = queue_position;
                self.eta = eta;
                if queue_position > 0 {
                    JobStatus::Queued
                } else {
                    JobStatus::Processing
                }
            }
            JobUpdate::Reported(report) => self.absorb_report(report),
            JobUpdate::CancelConfirmed { refund_credits } => {
                self.refund_credits = Some(refund_credits);
                JobStatus::Cancelled
            }
            JobUpdate::Failed(failure) => {
                self.failure = Some(failure);
                JobStatus::Failed
            }
        };

        self.status = to;
        if from == to {
            Transition::Unchanged
        } else {
            Transition::Changed { from, to }
        }
    }

    fn absorb_report(&mut self, report: StatusReport) -> JobStatus {
        if let Some(message) = report.message {
            self.message = Some(message);
        }
        if let Some(position) = report.queue_position {
            self.queue_position = position;
        }

        match report.status {
            RemoteStatus::Queued => {
                if report.queue_position == Some(0) || self.status == JobStatus::Processing {
                    JobStatus::Processing
                } else {
                    JobStatus::Queued
                }
            }
            RemoteStatus::Processing => {
                self.queue_position = 0;
                JobStatus::Processing
            }
            RemoteStatus::Completed => {
                self.queue_position = 0;
                self.result_url = report.result_url;
                JobStatus::Completed
            }
            RemoteStatus::Failed => {
                let reason = self
                    .message
                    .clone()
                    .unwrap_or_else(|| "render failed on the server".to_string());
                self.failure = Some(JobFailure::GenerationFailed(reason));
                JobStatus::Failed
            }
            RemoteStatus::Cancelled => JobStatus::Cancelled,
        }
    }
}

#[derive(Debug)]
struct JobCell {
    job: Mutex<GenerationJob>,
    status_tx: watch::Sender<JobStatus>,
}

/// Shared handle to one job.
///
/// Cloning is cheap. The poll loop and [`Orchestrator::cancel`](crate::Orchestrator::cancel)
/// may hold clones concurrently; both mutate through [`JobHandle::apply`], so
/// the terminal-status-is-final invariant holds under any interleaving.
/// The job is dropped with its last handle.
#[derive(Debug, Clone)]
pub struct JobHandle {
    inner: Arc<JobCell>,
}

impl JobHandle {
    /// Wrap a job.
    pub fn new(job: GenerationJob) -> Self {
        let (status_tx, _) = watch::channel(job.status());
        Self {
            inner: Arc::new(JobCell {
                job: Mutex::new(job),
                status_tx,
            }),
        }
    }

    /// Copy of the job as it is now.
    pub fn snapshot(&self) -> GenerationJob {
        self.inner.job.lock().clone()
    }

    /// Remote id.
    pub fn id(&self) -> String {
        self.inner.job.lock().id().to_string()
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        self.inner.job.lock().status()
    }

    /// Apply an update and publish the new status to subscribers.
    pub fn apply(&self, update: JobUpdate) -> Transition {
        let mut job = self.inner.job.lock();
        let transition = job.apply(update);
        if let Transition::Changed { to, .. } = transition {
            self.inner.status_tx.send_replace(to);
        }
        transition
    }

    /// Watch status changes from now on.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.inner.status_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tier;

    fn job() -> GenerationJob {
        GenerationJob::new(
            vec![SourceImage::jpeg(vec![0u8])],
            CharacterDescriptor::new("Zorro", "Zorro", Tier::Modern),
            None,
        )
    }

    fn ack(queue_position: u32) -> JobUpdate {
        JobUpdate::Acknowledged {
            job_id: "job-1".into(),
            queue_position,
            eta: Duration::from_secs(25),
        }
    }

    fn report(status: RemoteStatus, queue_position: Option<u32>) -> JobUpdate {
        JobUpdate::Reported(StatusReport {
            status,
            result_url: None,
            message: None,
            queue_position,
        })
    }

    #[test]
    fn test_ack_with_queue_goes_to_queued() {
        let mut j = job();
        assert_eq!(
            j.apply(ack(3)),
            Transition::Changed {
                from: JobStatus::Submitting,
                to: JobStatus::Queued
            }
        );
        assert_eq!(j.id(), "job-1");
        assert_eq!(j.queue_position(), 3);
    }

    #[test]
    fn test_ack_without_queue_goes_to_processing() {
        let mut j = job();
        j.apply(ack(0));
        assert_eq!(j.status(), JobStatus::Processing);
    }

    #[test]
    fn test_queue_reaching_zero_moves_to_processing() {
        let mut j = job();
        j.apply(ack(2));
        assert_eq!(j.apply(report(RemoteStatus::Queued, Some(1))), Transition::Unchanged);
        assert_eq!(j.queue_position(), 1);
        assert_eq!(
            j.apply(report(RemoteStatus::Queued, Some(0))),
            Transition::Changed {
                from: JobStatus::Queued,
                to: JobStatus::Processing
            }
        );
    }

    #[test]
    fn test_processing_never_regresses_to_queued() {
        let mut j = job();
        j.apply(ack(0));
        j.apply(report(RemoteStatus::Queued, None));
        assert_eq!(j.status(), JobStatus::Processing);
    }

    #[test]
    fn test_completed_records_result_url() {
        let mut j = job();
        j.apply(ack(0));
        j.apply(JobUpdate::Reported(StatusReport {
            status: RemoteStatus::Completed,
            result_url: Some("https://cdn/x.png".into()),
            message: None,
            queue_position: None,
        }));
        assert_eq!(j.status(), JobStatus::Completed);
        assert_eq!(j.result_url(), Some("https://cdn/x.png"));
    }

    #[test]
    fn test_server_failure_carries_message() {
        let mut j = job();
        j.apply(ack(0));
        j.apply(JobUpdate::Reported(StatusReport {
            status: RemoteStatus::Failed,
            result_url: None,
            message: Some("no face detected".into()),
            queue_position: None,
        }));
        assert_eq!(
            j.failure(),
            Some(&JobFailure::GenerationFailed("no face detected".into()))
        );
    }

    #[test]
    fn test_terminal_status_is_final_under_any_later_update() {
        let late_updates = [
            report(RemoteStatus::Processing, None),
            report(RemoteStatus::Failed, None),
            JobUpdate::CancelConfirmed { refund_credits: 5 },
            JobUpdate::Failed(JobFailure::Timeout),
            ack(4),
        ];
        for update in late_updates {
            let mut j = job();
            j.apply(ack(0));
            j.apply(report(RemoteStatus::Completed, None));
            assert_eq!(
                j.apply(update),
                Transition::IgnoredTerminal {
                    current: JobStatus::Completed
                }
            );
            assert_eq!(j.status(), JobStatus::Completed);
            assert!(j.refund_credits().is_none());
            assert!(j.failure().is_none());
        }
    }

    #[test]
    fn test_cancel_confirmation_records_refund() {
        let mut j = job();
        j.apply(ack(1));
        j.apply(JobUpdate::CancelConfirmed { refund_credits: 2 });
        assert_eq!(j.status(), JobStatus::Cancelled);
        assert_eq!(j.refund_credits(), Some(2));
    }

    #[test]
    fn test_only_rate_limit_failure_is_not_retryable() {
        assert!(JobFailure::Timeout.is_retryable());
        assert!(JobFailure::GenerationFailed("x".into()).is_retryable());
        assert!(JobFailure::Network("x".into()).is_retryable());
        assert!(!JobFailure::RateLimitExceeded { attempts: 5 }.is_retryable());
    }

    #[test]
    fn test_handle_publishes_status_changes() {
        let handle = JobHandle::new(job());
        let mut rx = handle.subscribe();
        handle.apply(ack(0));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), JobStatus::Processing);

        // attribute-only update: no new notification
        handle.apply(report(RemoteStatus::Processing, Some(0)));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_handle_clones_share_state() {
        let a = JobHandle::new(job());
        let b = a.clone();
        a.apply(ack(0));
        assert_eq!(b.status(), JobStatus::Processing);
        assert_eq!(b.snapshot().id(), "job-1");
    }
}
