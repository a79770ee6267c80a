//! In-process render service.
//!
//! Models the parts of the remote service the orchestrator depends on:
//! a FIFO queue that drains at a fixed rate, a fixed processing time, a
//! refund window for cancellations, and scripted throttle / network-failure
//! bursts. Time comes from `tokio::time`, so tests running with a paused
//! clock see exact, repeatable behaviour.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{
    CallOutcome, CancelReceipt, RemoteStatus, RenderService, StatusReport, SubmitAck,
    SubmitRequest,
};

/// Behaviour knobs for [`SimulatedRenderService`].
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    /// Jobs already ahead of each new submission.
    pub initial_queue: u32,
    /// Time for the queue to advance by one position.
    pub queue_step: Duration,
    /// Rendering time once the job leaves the queue.
    pub processing_time: Duration,
    /// Cancellations within this window after submission are refunded.
    pub refund_window: Duration,
    /// Credits refunded inside the window.
    pub refund_credits: u32,
    /// When set, jobs end `failed` with this message instead of completing.
    pub failure_message: Option<String>,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            initial_queue: 0,
            queue_step: Duration::from_secs(30),
            processing_time: Duration::from_secs(40),
            refund_window: Duration::from_secs(30),
            refund_credits: 1,
            failure_message: None,
        }
    }
}

#[derive(Debug)]
struct SimJob {
    submitted_at: Instant,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct SimState {
    jobs: HashMap<String, SimJob>,
    throttle_next: u32,
    fail_next: u32,
    submit_calls: u32,
    status_calls: u32,
    cancel_calls: u32,
}

impl SimState {
    /// Consume one scripted fault, if any is pending.
    fn scripted_fault<T>(&mut self) -> Option<CallOutcome<T>> {
        if self.throttle_next > 0 {
            self.throttle_next -= 1;
            return Some(CallOutcome::Throttled);
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Some(CallOutcome::NetworkFailure("simulated connection reset".into()));
        }
        None
    }
}

/// In-process [`RenderService`].
#[derive(Debug, Default)]
pub struct SimulatedRenderService {
    profile: SimulationProfile,
    state: Mutex<SimState>,
}

impl SimulatedRenderService {
    /// Create a simulator with the given behaviour.
    pub fn new(profile: SimulationProfile) -> Self {
        Self {
            profile,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Answer the next `n` calls (any endpoint) with a throttle.
    pub fn throttle_next(&self, n: u32) {
        self.state.lock().throttle_next = n;
    }

    /// Answer the next `n` calls (after scripted throttles) with a network failure.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().fail_next = n;
    }

    /// Submit calls received, including throttled ones.
    pub fn submit_calls(&self) -> u32 {
        self.state.lock().submit_calls
    }

    /// Status calls received, including throttled ones.
    pub fn status_calls(&self) -> u32 {
        self.state.lock().status_calls
    }

    /// Cancel calls received, including throttled ones.
    pub fn cancel_calls(&self) -> u32 {
        self.state.lock().cancel_calls
    }

    fn queue_position_at(&self, age: Duration) -> u32 {
        if self.profile.initial_queue == 0 || self.profile.queue_step.is_zero() {
            return 0;
        }
        let advanced = (age.as_millis() / self.profile.queue_step.as_millis()) as u64;
        let advanced = u32::try_from(advanced).unwrap_or(u32::MAX);
        self.profile.initial_queue.saturating_sub(advanced)
    }

    fn finish_after(&self) -> Duration {
        self.profile.queue_step * self.profile.initial_queue + self.profile.processing_time
    }

    fn report_at(&self, age: Duration) -> StatusReport {
        let queue_position = self.queue_position_at(age);
        if age >= self.finish_after() {
            return match &self.profile.failure_message {
                Some(message) => StatusReport {
                    status: RemoteStatus::Failed,
                    result_url: None,
                    message: Some(message.clone()),
                    queue_position: Some(0),
                },
                None => StatusReport {
                    status: RemoteStatus::Completed,
                    result_url: Some("sim://renders/result.png".to_string()),
                    message: Some("Render complete".to_string()),
                    queue_position: Some(0),
                },
            };
        }
        if queue_position > 0 {
            StatusReport {
                status: RemoteStatus::Queued,
                result_url: None,
                message: Some(format!("{queue_position} jobs ahead")),
                queue_position: Some(queue_position),
            }
        } else {
            StatusReport {
                status: RemoteStatus::Processing,
                result_url: None,
                message: Some("Rendering".to_string()),
                queue_position: Some(0),
            }
        }
    }
}

#[async_trait]
impl RenderService for SimulatedRenderService {
    async fn submit(&self, request: &SubmitRequest) -> CallOutcome<SubmitAck> {
        let mut state = self.state.lock();
        state.submit_calls += 1;
        if let Some(fault) = state.scripted_fault() {
            return fault;
        }
        if request.character.name.trim().is_empty() {
            return CallOutcome::Rejected("character is required".into());
        }
        if request.reference_images.len() > 2 {
            return CallOutcome::Rejected("between 1 and 3 images are required".into());
        }

        let job_id = format!("sim-{}", uuid::Uuid::new_v4());
        state.jobs.insert(
            job_id.clone(),
            SimJob {
                submitted_at: Instant::now(),
                cancelled: false,
            },
        );
        debug!(job_id = %job_id, "simulator: accepted job");

        let queue_position = self.profile.initial_queue;
        CallOutcome::Success(SubmitAck {
            job_id,
            status: if queue_position > 0 {
                RemoteStatus::Queued
            } else {
                RemoteStatus::Processing
            },
            queue_position: Some(queue_position),
        })
    }

    async fn status(&self, job_id: &str) -> CallOutcome<StatusReport> {
        let mut state = self.state.lock();
        state.status_calls += 1;
        if let Some(fault) = state.scripted_fault() {
            return fault;
        }
        let Some(job) = state.jobs.get(job_id) else {
            return CallOutcome::Rejected(format!("unknown job {job_id}"));
        };
        if job.cancelled {
            return CallOutcome::Success(StatusReport {
                status: RemoteStatus::Cancelled,
                result_url: None,
                message: Some("Cancelled".to_string()),
                queue_position: Some(0),
            });
        }
        CallOutcome::Success(self.report_at(job.submitted_at.elapsed()))
    }

    async fn cancel(&self, job_id: &str) -> CallOutcome<CancelReceipt> {
        let mut state = self.state.lock();
        state.cancel_calls += 1;
        if let Some(fault) = state.scripted_fault() {
            return fault;
        }
        let finish_after = self.finish_after();
        let Some(job) = state.jobs.get_mut(job_id) else {
            return CallOutcome::Rejected(format!("unknown job {job_id}"));
        };
        let age = job.submitted_at.elapsed();

        if job.cancelled {
            return CallOutcome::Success(CancelReceipt {
                refund_credits: 0,
                status: Some(RemoteStatus::Cancelled),
                result_url: None,
                message: None,
            });
        }
        if age >= finish_after {
            // too late to cancel: echo the finished job
            let report = self.report_at(age);
            return CallOutcome::Success(CancelReceipt {
                refund_credits: 0,
                status: Some(report.status),
                result_url: report.result_url,
                message: report.message,
            });
        }

        job.cancelled = true;
        let refund_credits = if age <= self.profile.refund_window {
            self.profile.refund_credits
        } else {
            0
        };
        debug!(job_id, refund_credits, age_ms = age.as_millis() as u64, "simulator: cancelled");
        CallOutcome::Success(CancelReceipt {
            refund_credits,
            status: Some(RemoteStatus::Cancelled),
            result_url: None,
            message: None,
        })
    }
}
