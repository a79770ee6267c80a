//! # Orchestrator Configuration
//!
//! ## Responsibility
//! Describe every tunable the orchestrator consumes: the remote endpoint,
//! the adaptive backoff constants, the polling cadence and the ETA table.
//! Configuration is loaded from TOML (see [`loader`]) and checked by
//! [`validation`] before use.
//!
//! ## Guarantees
//! - Every field has a documented default; an empty TOML file is a valid config
//! - Deterministic: same TOML input always produces the same `OrchestratorConfig`
//! - Schema-exportable via `schemars`
//!
//! ## NOT Responsible For
//! - Hot reload: settings are read once per orchestrator
//! - Building the HTTP client (that belongs to `service`)

pub mod loader;
pub mod validation;

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Tier;

// ── Default value functions ──────────────────────────────────────────────

fn default_development_url() -> String {
    "http://localhost:8787/api".to_string()
}

fn default_production_url() -> String {
    "https://render.example.com/api".to_string()
}

/// Default per-request HTTP timeout: 60s. Submits carry up to three photos.
fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_base_delay_ms() -> u64 {
    80_000
}

fn default_delay_increment_ms() -> u64 {
    40_000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_max_retries() -> u32 {
    5
}

/// Countdown cadence while waiting on the limiter: once per second.
fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

/// Default bounded wait for a job: 10 minutes.
fn default_max_wait_ms() -> u64 {
    600_000
}

fn default_queue_delay_per_position_s() -> u64 {
    30
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for an [`Orchestrator`](crate::Orchestrator).
///
/// # Example
///
/// ```toml
/// [service]
/// environment = "production"
///
/// [rate_limit]
/// max_retries = 3
///
/// [polling]
/// interval_ms = 4000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Remote render service endpoint selection.
    pub service: ServiceConfig,
    /// Adaptive backoff constants shared by every remote call.
    pub rate_limit: RateLimitConfig,
    /// Poll cadence and bounded wait.
    pub polling: PollingConfig,
    /// ETA table.
    pub estimator: EstimatorConfig,
    /// Logging output.
    pub observability: ObservabilityConfig,
}

// ── Service endpoint ─────────────────────────────────────────────────────

/// Which deployment of the render service to talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Local or staging backend.
    Development,
    /// Public backend.
    Production,
}

impl Default for Environment {
    /// Debug builds talk to development, release builds to production.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Environment::Development
        } else {
            Environment::Production
        }
    }
}

/// Remote render service endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Selected deployment. Defaults from the build profile.
    pub environment: Environment,
    /// Base URL used when `environment = "development"`.
    pub development_url: String,
    /// Base URL used when `environment = "production"`.
    pub production_url: String,
    /// Per-request HTTP timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            development_url: default_development_url(),
            production_url: default_production_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ServiceConfig {
    /// Base URL for the selected environment, without a trailing slash.
    pub fn base_url(&self) -> &str {
        let url = match self.environment {
            Environment::Development => &self.development_url,
            Environment::Production => &self.production_url,
        };
        url.trim_end_matches('/')
    }

    /// Per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ── Rate limiting ────────────────────────────────────────────────────────

/// Adaptive backoff constants.
///
/// The limiter grows linearly: each throttle adds `delay_increment_ms`,
/// saturating at `max_delay_ms`; any success drops back to `base_delay_ms`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Cooldown after a success and the floor of the delay (ms).
    pub base_delay_ms: u64,
    /// Added to the delay on every throttle or network failure (ms).
    pub delay_increment_ms: u64,
    /// Ceiling of the delay (ms).
    pub max_delay_ms: u64,
    /// Attempts per remote call, including the first.
    pub max_retries: u32,
    /// Countdown tick cadence while waiting (ms).
    pub tick_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            delay_increment_ms: default_delay_increment_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

// ── Polling ──────────────────────────────────────────────────────────────

/// Poll cadence and bounded wait for a single job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    /// Sleep between status polls (ms).
    pub interval_ms: u64,
    /// Wall-clock deadline measured from the start of polling (ms).
    pub max_wait_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl PollingConfig {
    /// Poll interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Bounded wait as a [`Duration`].
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

// ── ETA ──────────────────────────────────────────────────────────────────

/// Base processing seconds per tier.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct TierBaseSeconds {
    /// Base seconds for [`Tier::Modern`].
    pub modern: u64,
    /// Base seconds for [`Tier::Superhero`].
    pub superhero: u64,
    /// Base seconds for [`Tier::Fantasy`].
    pub fantasy: u64,
    /// Base seconds for [`Tier::Cartoon`].
    pub cartoon: u64,
}

impl Default for TierBaseSeconds {
    fn default() -> Self {
        Self {
            modern: 25,
            superhero: 35,
            fantasy: 45,
            cartoon: 40,
        }
    }
}

impl TierBaseSeconds {
    /// Look up the base seconds for `tier`.
    pub fn get(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Modern => self.modern,
            Tier::Superhero => self.superhero,
            Tier::Fantasy => self.fantasy,
            Tier::Cartoon => self.cartoon,
        }
    }
}

/// ETA estimator constants.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Seconds added per job ahead in the remote queue.
    pub queue_delay_per_position_s: u64,
    /// Per-tier base processing time.
    pub tier_base_s: TierBaseSeconds,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            queue_delay_per_position_s: default_queue_delay_per_position_s(),
            tier_base_s: TierBaseSeconds::default(),
        }
    }
}

// ── Observability ────────────────────────────────────────────────────────

/// Logging output settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `"pretty"` or `"json"`.
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
        }
    }
}

/// JSON Schema for [`OrchestratorConfig`], for editor autocomplete.
pub fn json_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(OrchestratorConfig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.rate_limit.base_delay_ms, 80_000);
        assert_eq!(cfg.rate_limit.delay_increment_ms, 40_000);
        assert_eq!(cfg.rate_limit.max_delay_ms, 300_000);
        assert_eq!(cfg.rate_limit.max_retries, 5);
        assert_eq!(cfg.estimator.queue_delay_per_position_s, 30);
        assert_eq!(cfg.estimator.tier_base_s.get(Tier::Modern), 25);
        assert_eq!(cfg.estimator.tier_base_s.get(Tier::Superhero), 35);
        assert_eq!(cfg.estimator.tier_base_s.get(Tier::Fantasy), 45);
        assert_eq!(cfg.estimator.tier_base_s.get(Tier::Cartoon), 40);
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, OrchestratorConfig::default());
    }

    #[test]
    fn test_base_url_follows_environment_and_strips_slash() {
        let mut svc = ServiceConfig {
            development_url: "http://dev.local/api/".into(),
            production_url: "https://prod.example/api".into(),
            environment: Environment::Development,
            ..ServiceConfig::default()
        };
        assert_eq!(svc.base_url(), "http://dev.local/api");
        svc.environment = Environment::Production;
        assert_eq!(svc.base_url(), "https://prod.example/api");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let cfg = OrchestratorConfig::default();
        let text = toml::to_string(&cfg).unwrap();
        let back: OrchestratorConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_json_schema_lists_sections() {
        let schema = serde_json::to_value(json_schema()).unwrap();
        let props = &schema["properties"];
        for section in ["service", "rate_limit", "polling", "estimator", "observability"] {
            assert!(props.get(section).is_some(), "missing {section}");
        }
    }
}
