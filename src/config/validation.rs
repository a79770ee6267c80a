//! Configuration validation engine.
//!
//! ## Responsibility
//! Check semantic constraints on a parsed [`OrchestratorConfig`] that the type
//! system cannot express (ranges, cross-field ordering, URL shape).
//!
//! ## Guarantees
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use super::OrchestratorConfig;

/// Errors arising from configuration parsing, validation, or I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "rate_limit.base_delay_ms").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field: field.into(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Validate all semantic constraints on an [`OrchestratorConfig`].
///
/// # Returns
///
/// - `Ok(())` if all constraints pass.
/// - `Err(Vec<ConfigError>)` with every violation found.
pub fn validate(config: &OrchestratorConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Service endpoint ─────────────────────────────────────────────
    for (field, url) in [
        ("service.development_url", &config.service.development_url),
        ("service.production_url", &config.service.production_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(invalid(field, url, "must start with http:// or https://"));
        }
    }

    if config.service.request_timeout_ms == 0 {
        errors.push(invalid("service.request_timeout_ms", 0, "must be at least 1"));
    }

    // ── Rate limiting ────────────────────────────────────────────────
    let rl = &config.rate_limit;
    if rl.base_delay_ms > rl.max_delay_ms {
        errors.push(invalid(
            "rate_limit.base_delay_ms",
            rl.base_delay_ms,
            "must be \u{2264} max_delay_ms",
        ));
    }

    if rl.max_retries == 0 {
        errors.push(invalid("rate_limit.max_retries", 0, "must be at least 1"));
    }

    if rl.tick_interval_ms == 0 {
        errors.push(invalid("rate_limit.tick_interval_ms", 0, "must be at least 1"));
    }

    // ── Polling ──────────────────────────────────────────────────────
    if config.polling.interval_ms < 100 {
        errors.push(invalid(
            "polling.interval_ms",
            config.polling.interval_ms,
            "must be at least 100",
        ));
    }

    if config.polling.max_wait_ms < config.polling.interval_ms {
        errors.push(invalid(
            "polling.max_wait_ms",
            config.polling.max_wait_ms,
            "must be \u{2265} polling.interval_ms",
        ));
    }

    // ── Observability ────────────────────────────────────────────────
    let format = config.observability.log_format.as_str();
    if format != "pretty" && format != "json" {
        errors.push(invalid(
            "observability.log_format",
            format,
            "must be \"pretty\" or \"json\"",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: &ConfigError) -> &str {
        match err {
            ConfigError::InvalidField { field, .. } => field,
            _ => "",
        }
    }

    #[test]
    fn test_validate_default_config_passes() {
        assert!(validate(&OrchestratorConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_base_delay_exceeds_max_fails() {
        let mut cfg = OrchestratorConfig::default();
        cfg.rate_limit.base_delay_ms = 400_000;
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(field_of(&errs[0]), "rate_limit.base_delay_ms");
    }

    #[test]
    fn test_validate_base_delay_equals_max_passes() {
        let mut cfg = OrchestratorConfig::default();
        cfg.rate_limit.base_delay_ms = cfg.rate_limit.max_delay_ms;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_validate_zero_retries_fails() {
        let mut cfg = OrchestratorConfig::default();
        cfg.rate_limit.max_retries = 0;
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(field_of(&errs[0]), "rate_limit.max_retries");
    }

    #[test]
    fn test_validate_zero_base_delay_is_allowed() {
        let mut cfg = OrchestratorConfig::default();
        cfg.rate_limit.base_delay_ms = 0;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_validate_non_http_url_fails() {
        let mut cfg = OrchestratorConfig::default();
        cfg.service.production_url = "ftp://nope".into();
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(field_of(&errs[0]), "service.production_url");
    }

    #[test]
    fn test_validate_max_wait_below_interval_fails() {
        let mut cfg = OrchestratorConfig::default();
        cfg.polling.interval_ms = 10_000;
        cfg.polling.max_wait_ms = 5_000;
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(field_of(&errs[0]), "polling.max_wait_ms");
    }

    #[test]
    fn test_validate_sub_100ms_poll_interval_fails() {
        let mut cfg = OrchestratorConfig::default();
        cfg.polling.interval_ms = 50;
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(field_of(&errs[0]), "polling.interval_ms");
    }

    #[test]
    fn test_validate_unknown_log_format_fails() {
        let mut cfg = OrchestratorConfig::default();
        cfg.observability.log_format = "xml".into();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_validate_collects_every_error() {
        let mut cfg = OrchestratorConfig::default();
        cfg.rate_limit.max_retries = 0;
        cfg.rate_limit.tick_interval_ms = 0;
        cfg.polling.interval_ms = 0;
        cfg.service.request_timeout_ms = 0;
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(errs.len(), 4);
    }

    #[test]
    fn test_invalid_field_message_contains_path_and_value() {
        let err = invalid("rate_limit.max_retries", 0, "must be at least 1");
        let msg = err.to_string();
        assert!(msg.contains("rate_limit.max_retries"));
        assert!(msg.contains('0'));
    }
}
