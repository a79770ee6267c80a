//! JSON-over-HTTP client for the render service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{CallOutcome, CancelReceipt, RenderService, StatusReport, SubmitAck, SubmitRequest};
use crate::config::ServiceConfig;

/// Error body shapes the service is known to send.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Remote render service over HTTP.
///
/// ## Example
///
/// ```no_run
/// use render_orchestrator::HttpRenderService;
/// use std::time::Duration;
///
/// let service = HttpRenderService::new("https://render.example.com/api")
///     .with_timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct HttpRenderService {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRenderService {
    /// Create a client for `base_url` (trailing slash optional).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            timeout: Duration::from_secs(60),
        }
    }

    /// Create a client for the environment selected in `config`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.base_url()).with_timeout(config.request_timeout())
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> CallOutcome<T> {
        let response = match request.timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => return CallOutcome::NetworkFailure(format!("request failed: {e}")),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            debug!(%status, "render service: throttled");
            return CallOutcome::Throttled;
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return CallOutcome::NetworkFailure(describe_error(status, &body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return CallOutcome::Rejected(describe_error(status, &body));
        }

        match response.json::<T>().await {
            Ok(value) => CallOutcome::Success(value),
            Err(e) => CallOutcome::NetworkFailure(format!("failed to parse response: {e}")),
        }
    }
}

/// `"<status>: <message>"`, preferring a JSON `error`/`message` field over
/// the raw body.
fn describe_error(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| body.trim().to_string());
    if detail.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {detail}")
    }
}

#[async_trait]
impl RenderService for HttpRenderService {
    async fn submit(&self, request: &SubmitRequest) -> CallOutcome<SubmitAck> {
        let url = format!("{}/submit", self.base_url);
        self.send(self.client.post(url).json(request)).await
    }

    async fn status(&self, job_id: &str) -> CallOutcome<StatusReport> {
        let url = format!("{}/status/{}", self.base_url, job_id);
        self.send(self.client.get(url)).await
    }

    async fn cancel(&self, job_id: &str) -> CallOutcome<CancelReceipt> {
        let url = format!("{}/cancel/{}", self.base_url, job_id);
        self.send(self.client.post(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    #[test]
    fn test_new_strips_trailing_slash() {
        assert_eq!(HttpRenderService::new("http://x/api/").base_url(), "http://x/api");
    }

    #[test]
    fn test_from_config_uses_selected_environment() {
        let cfg = ServiceConfig {
            environment: Environment::Production,
            production_url: "https://prod.test".into(),
            ..ServiceConfig::default()
        };
        assert_eq!(HttpRenderService::from_config(&cfg).base_url(), "https://prod.test");
    }

    #[test]
    fn test_describe_error_prefers_json_error_field() {
        let msg = describe_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error":"character is required"}"#,
        );
        assert_eq!(msg, "422 Unprocessable Entity: character is required");
    }

    #[test]
    fn test_describe_error_falls_back_to_body_then_status() {
        assert_eq!(
            describe_error(StatusCode::BAD_REQUEST, "plain text"),
            "400 Bad Request: plain text"
        );
        assert_eq!(describe_error(StatusCode::BAD_REQUEST, ""), "400 Bad Request");
    }
}
