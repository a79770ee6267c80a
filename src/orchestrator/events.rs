//! Progress events for caller-side presentation.
//!
//! The orchestrator never renders anything itself. It pushes [`JobEvent`]s
//! into an [`EventSink`], which is either a tokio channel the caller drains
//! or nothing at all.

use std::time::Duration;

use tokio::sync::mpsc;

use super::job::JobStatus;

/// Something a caller may want to show while a job is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// The service accepted the job.
    Submitted {
        /// Remote job id.
        job_id: String,
        /// Position in the remote queue at submission time.
        queue_position: u32,
        /// Initial estimate of total processing time.
        eta: Duration,
    },
    /// A remote call was throttled or failed and will be retried.
    Retrying {
        /// Attempt that just failed (1-based).
        attempt: u32,
        /// How long the client will wait before the next attempt.
        delay: Duration,
    },
    /// Countdown tick while waiting on the rate limiter.
    Countdown {
        /// Time left before the next attempt.
        remaining: Duration,
    },
    /// A status poll completed.
    Progress {
        /// Remote job id.
        job_id: String,
        /// Local status after applying the report.
        status: JobStatus,
        /// Reported queue position.
        queue_position: u32,
        /// Human-readable message (from the service when it sent one).
        message: String,
        /// Time since polling started.
        elapsed: Duration,
    },
}

/// Optional destination for [`JobEvent`]s.
///
/// Sending never blocks and never fails the job: a dropped receiver simply
/// turns the sink into a no-op.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<JobEvent>>,
}

impl EventSink {
    /// A sink that discards everything.
    pub fn none() -> Self {
        Self { tx: None }
    }

    /// A sink paired with the receiver the caller should drain.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Deliver an event if anyone is listening.
    pub fn emit(&self, event: JobEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(JobEvent::Countdown {
            remaining: Duration::from_secs(2),
        });
        sink.emit(JobEvent::Countdown {
            remaining: Duration::from_secs(1),
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            JobEvent::Countdown {
                remaining: Duration::from_secs(2)
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            JobEvent::Countdown {
                remaining: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(JobEvent::Countdown {
            remaining: Duration::ZERO,
        });
    }

    #[test]
    fn test_none_sink_discards() {
        EventSink::none().emit(JobEvent::Retrying {
            attempt: 1,
            delay: Duration::from_secs(80),
        });
    }
}
