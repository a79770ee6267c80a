//! # render-orchestrator
//!
//! Client-side orchestration for long-running "photo → character render" jobs
//! against a heavily throttled remote compute service.
//!
//! ## Architecture
//!
//! ```text
//! caller → Orchestrator::submit ─┬─ identity::compile (lock directive)
//!                                └─ RequestExecutor ── AdaptiveRateLimiter (shared)
//!        → Orchestrator::poll_until_terminal ── RequestExecutor per tick
//!        → Orchestrator::cancel ── RequestExecutor ── CreditLedger
//! ```
//!
//! Every remote call, whatever the endpoint, routes through the same
//! [`throttle::RequestExecutor`], so one throttle burst slows every job the
//! orchestrator owns.

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod eta;
pub mod identity;
pub mod metrics;
pub mod orchestrator;
pub mod service;
pub mod throttle;

// Re-exports for convenience
pub use eta::{format_minutes_seconds, EtaEstimator};
pub use identity::compiler::{compile, tier_directive, LockDirective};
pub use identity::IdentityProfile;
pub use orchestrator::events::{EventSink, JobEvent};
pub use orchestrator::job::{GenerationJob, JobFailure, JobHandle, JobStatus};
pub use orchestrator::{CancelOutcome, CreditLedger, JobError, NoopLedger, Orchestrator};
pub use service::{CallOutcome, HttpRenderService, RenderService, SimulatedRenderService};
pub use throttle::{AdaptiveRateLimiter, ExecutorError, RequestExecutor};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"` — structured JSON output for log aggregators
/// - anything else (including unset) — human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=render_orchestrator=debug`).
///
/// # Errors
///
/// Returns [`OrchestratorError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Example
///
/// ```no_run
/// # use render_orchestrator::{init_tracing, OrchestratorError};
/// # fn example() -> Result<(), OrchestratorError> {
/// init_tracing()?;
/// # Ok(()) }
/// ```
pub fn init_tracing() -> Result<(), OrchestratorError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    init_tracing_with_format(&format)
}

/// Initialise tracing with an explicit format (`"json"` or `"pretty"`).
///
/// Used by the binary when the format comes from the config file rather than
/// the environment.
///
/// # Errors
///
/// Returns [`OrchestratorError::Other`] if a global subscriber is already set.
pub fn init_tracing_with_format(format: &str) -> Result<(), OrchestratorError> {
    let result = match format {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| OrchestratorError::Other(format!("tracing init failed: {e}")))
}

/// Top-level orchestrator errors.
///
/// Job-lifecycle outcomes (`SubmissionFailed`, `Timeout`, ...) are *not*
/// here: those are expected results and live in [`JobError`] and
/// [`JobFailure`]. This enum covers process-level failures.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] config::validation::ConfigError),

    /// A job could not be started or cancelled.
    #[error(transparent)]
    Job(#[from] JobError),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

/// Style/difficulty class of a target character.
///
/// Drives both prompt phrasing ([`tier_directive`]) and time estimation
/// ([`EtaEstimator`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Contemporary outfits and everyday styling.
    Modern,
    /// Comic-book heroes and villains.
    Superhero,
    /// Armour, elves, wizards; heavy stylisation.
    Fantasy,
    /// Animated / toon styles.
    Cartoon,
}

impl Tier {
    /// All tiers in catalog order.
    pub const ALL: [Tier; 4] = [Tier::Modern, Tier::Superhero, Tier::Fantasy, Tier::Cartoon];

    /// Lower-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Modern => "modern",
            Tier::Superhero => "superhero",
            Tier::Fantasy => "fantasy",
            Tier::Cartoon => "cartoon",
        }
    }

    /// Tiers where the remote model most often drifts away from the
    /// subject's face.
    pub fn is_face_drift_prone(&self) -> bool {
        matches!(self, Tier::Fantasy | Tier::Cartoon)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The character a subject is rendered as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterDescriptor {
    /// Display name (e.g. "Aragorn").
    pub name: String,
    /// Franchise or work the character comes from.
    pub source: String,
    /// Difficulty/style tier.
    pub tier: Tier,
}

impl CharacterDescriptor {
    /// Create a descriptor from any string-like name and source.
    pub fn new(name: impl Into<String>, source: impl Into<String>, tier: Tier) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            tier,
        }
    }
}

/// An opaque source photo supplied by the caller.
///
/// Serialized as a base64 payload plus MIME type for the submit endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// MIME type, e.g. `image/jpeg`.
    pub mime_type: String,
    /// Raw encoded image bytes.
    pub data: Vec<u8>,
}

impl SourceImage {
    /// Wrap raw JPEG bytes.
    pub fn jpeg(data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: "image/jpeg".to_string(),
            data: data.into(),
        }
    }

    /// Base64 (standard alphabet) encoding of the image bytes.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

impl Serialize for SourceImage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("SourceImage", 2)?;
        s.serialize_field("mime_type", &self.mime_type)?;
        s.serialize_field("data", &self.to_base64())?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_wire_names_round_trip_through_serde() {
        for tier in Tier::ALL {
            let json = serde_json::to_string(&tier).unwrap();
            assert_eq!(json, format!("\"{}\"", tier.as_str()));
            let back: Tier = serde_json::from_str(&json).unwrap();
            assert_eq!(back, tier);
        }
    }

    #[test]
    fn test_only_fantasy_and_cartoon_are_face_drift_prone() {
        assert!(!Tier::Modern.is_face_drift_prone());
        assert!(!Tier::Superhero.is_face_drift_prone());
        assert!(Tier::Fantasy.is_face_drift_prone());
        assert!(Tier::Cartoon.is_face_drift_prone());
    }

    #[test]
    fn test_source_image_serializes_as_base64() {
        let img = SourceImage::jpeg(vec![0xff, 0xd8, 0xff]);
        let value = serde_json::to_value(&img).unwrap();
        assert_eq!(value["mime_type"], "image/jpeg");
        assert_eq!(value["data"], "/9j/");
    }

    #[test]
    fn test_init_tracing_twice_returns_err_not_panic() {
        let _ = init_tracing_with_format("pretty");
        let second = init_tracing_with_format("json");
        assert!(second.is_err());
    }
}
