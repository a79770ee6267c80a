//! Remote render service abstraction.
//!
//! Provides the [`RenderService`] trait and two implementations:
//! - [`HttpRenderService`]: the real JSON-over-HTTP endpoint
//! - [`SimulatedRenderService`]: in-process stand-in with a queue, processing
//!   time, refund window and scripted throttling, for demos and tests
//!
//! ## Wire contract
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | `POST {base}/submit` | [`SubmitRequest`] | [`SubmitAck`] |
//! | `GET {base}/status/{id}` | — | [`StatusReport`] |
//! | `POST {base}/cancel/{id}` | — | [`CancelReceipt`] |
//!
//! HTTP 429 is the only throttling signal. Transport errors, timeouts, 5xx
//! and undecodable bodies are network failures. Any other 4xx is a rejection.

pub mod http;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{CharacterDescriptor, SourceImage};

pub use http::HttpRenderService;
pub use simulated::{SimulatedRenderService, SimulationProfile};

/// Result of exactly one remote call, as seen by the
/// [`RequestExecutor`](crate::RequestExecutor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// The service answered normally.
    Success(T),
    /// The service asked the client to retry later.
    Throttled,
    /// The call never produced a usable answer.
    NetworkFailure(String),
    /// The service refused the request; retrying will not help.
    Rejected(String),
}

impl<T> CallOutcome<T> {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CallOutcome::Success(_) => "success",
            CallOutcome::Throttled => "throttled",
            CallOutcome::NetworkFailure(_) => "network_failure",
            CallOutcome::Rejected(_) => "rejected",
        }
    }

    /// Map the success payload.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> CallOutcome<U> {
        match self {
            CallOutcome::Success(v) => CallOutcome::Success(f(v)),
            CallOutcome::Throttled => CallOutcome::Throttled,
            CallOutcome::NetworkFailure(m) => CallOutcome::NetworkFailure(m),
            CallOutcome::Rejected(m) => CallOutcome::Rejected(m),
        }
    }
}

/// Job status as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    /// Waiting behind other jobs.
    Queued,
    /// Being rendered.
    Processing,
    /// Render finished; a result URL should accompany it.
    Completed,
    /// Render failed on the server.
    Failed,
    /// Cancelled on the server.
    Cancelled,
}

impl RemoteStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStatus::Queued => "queued",
            RemoteStatus::Processing => "processing",
            RemoteStatus::Completed => "completed",
            RemoteStatus::Failed => "failed",
            RemoteStatus::Cancelled => "cancelled",
        }
    }
}

/// Body of `POST submit`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    /// Primary subject photo.
    pub image: SourceImage,
    /// Extra subject photos after the primary (0–2). The primary is not repeated here.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<SourceImage>,
    /// Target character.
    pub character: CharacterDescriptor,
    /// Compiled identity-lock directive.
    pub identity_lock: String,
    /// Tier-specific styling directive.
    pub style_directive: String,
}

/// Response to `POST submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
    /// Id assigned by the service.
    pub job_id: String,
    /// Initial status.
    pub status: RemoteStatus,
    /// Jobs ahead of this one, when the service reports it.
    #[serde(default)]
    pub queue_position: Option<u32>,
}

/// Response to `GET status/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Current remote status.
    pub status: RemoteStatus,
    /// Render location once completed.
    #[serde(default)]
    pub result_url: Option<String>,
    /// Human-readable progress or error message.
    #[serde(default)]
    pub message: Option<String>,
    /// Jobs ahead of this one, when still queued.
    #[serde(default)]
    pub queue_position: Option<u32>,
}

/// Response to `POST cancel/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReceipt {
    /// Credits returned to the user. Zero outside the refund window.
    #[serde(default)]
    pub refund_credits: u32,
    /// Status the job was in when the cancel landed, if the service says.
    #[serde(default)]
    pub status: Option<RemoteStatus>,
    /// Render location, when the job had already completed.
    #[serde(default)]
    pub result_url: Option<String>,
    /// Server message, e.g. the reason a job had already failed.
    #[serde(default)]
    pub message: Option<String>,
}

/// The remote compute service contract.
///
/// Implementations perform exactly one call per method and classify the
/// result; retries and backoff belong to the executor.
#[async_trait]
pub trait RenderService: Send + Sync {
    /// Submit a new render job.
    async fn submit(&self, request: &SubmitRequest) -> CallOutcome<SubmitAck>;

    /// Fetch the current status of a job.
    async fn status(&self, job_id: &str) -> CallOutcome<StatusReport>;

    /// Ask the service to cancel a job.
    async fn cancel(&self, job_id: &str) -> CallOutcome<CancelReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_report_tolerates_missing_optionals() {
        let report: StatusReport = serde_json::from_str(r#"{"status":"processing"}"#).unwrap();
        assert_eq!(report.status, RemoteStatus::Processing);
        assert!(report.result_url.is_none());
        assert!(report.queue_position.is_none());
    }

    #[test]
    fn test_cancel_receipt_defaults_refund_to_zero() {
        let receipt: CancelReceipt = serde_json::from_str("{}").unwrap();
        assert_eq!(receipt.refund_credits, 0);
        assert!(receipt.status.is_none());
        assert!(receipt.result_url.is_none());
    }

    #[test]
    fn test_submit_request_sends_primary_image_once() {
        use crate::{CharacterDescriptor, SourceImage, Tier};

        let request = SubmitRequest {
            image: SourceImage::jpeg(vec![1, 2, 3]),
            reference_images: Vec::new(),
            character: CharacterDescriptor::new("Elsa", "Frozen", Tier::Cartoon),
            identity_lock: String::new(),
            style_directive: String::new(),
        };
        let body = serde_json::to_string(&request).unwrap();
        assert_eq!(body.matches("AQID").count(), 1);
        assert!(!body.contains("reference_images"));
    }

    #[test]
    fn test_call_outcome_map_preserves_failures() {
        let throttled: CallOutcome<u32> = CallOutcome::Throttled;
        assert_eq!(throttled.map(|v| v + 1), CallOutcome::Throttled);
        assert_eq!(CallOutcome::Success(1).map(|v| v + 1), CallOutcome::Success(2));
        assert_eq!(
            CallOutcome::<u32>::Rejected("no".into()).label(),
            "rejected"
        );
    }
}
