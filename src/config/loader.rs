//! Loading `orchestrator.toml`.
//!
//! Both entry points parse first and validate second, so a config handed
//! back to the caller has passed every check in [`validation`]. Errors name
//! their source (a path, or whatever label the caller passes for in-memory
//! text) and keep unreadable files apart from malformed ones.

use std::path::Path;

use super::validation::{self, ConfigError};
use super::OrchestratorConfig;

/// Read and validate the config file at `path`.
///
/// # Arguments
///
/// * `path` - TOML file; its display form labels any error
///
/// # Errors
///
/// [`ConfigError::Io`] when the file cannot be read, otherwise anything
/// [`load_from_str`] returns.
///
/// # Example
///
/// ```rust,ignore
/// use render_orchestrator::config::loader::load_from_file;
/// use std::path::Path;
///
/// let config = load_from_file(Path::new("orchestrator.toml"))?;
/// println!("talking to {}", config.service.base_url());
/// ```
pub fn load_from_file(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let file = path.display().to_string();
    match std::fs::read_to_string(path) {
        Ok(content) => load_from_str(&content, &file),
        Err(source) => Err(ConfigError::Io { file, source }),
    }
}

/// Parse and validate config text.
///
/// # Arguments
///
/// * `content` - TOML text; omitted sections and fields take their defaults
/// * `source_name` - label for error messages, e.g. `"inline"`
///
/// # Errors
///
/// - [`ConfigError::Parse`] for malformed TOML or unknown enum values
/// - [`ConfigError::Validation`] with one violated constraint per line
pub fn load_from_str(content: &str, source_name: &str) -> Result<OrchestratorConfig, ConfigError> {
    let config = toml::from_str::<OrchestratorConfig>(content).map_err(|source| {
        ConfigError::Parse {
            file: source_name.to_owned(),
            source,
        }
    })?;

    if let Err(violations) = validation::validate(&config) {
        let lines: Vec<String> = violations.iter().map(ToString::to_string).collect();
        return Err(ConfigError::Validation(lines.join("\n")));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::Tier;

    const VALID_TOML: &str = r#"
[service]
environment = "production"
production_url = "https://render.test/api"
request_timeout_ms = 30000

[rate_limit]
base_delay_ms = 1000
delay_increment_ms = 500
max_delay_ms = 5000
max_retries = 3

[polling]
interval_ms = 2000
max_wait_ms = 60000

[estimator]
queue_delay_per_position_s = 20

[estimator.tier_base_s]
fantasy = 50

[observability]
log_format = "json"
"#;

    #[test]
    fn test_load_from_str_valid_toml_succeeds() {
        let config = load_from_str(VALID_TOML, "test").expect("test: valid config");
        assert_eq!(config.service.environment, Environment::Production);
        assert_eq!(config.service.base_url(), "https://render.test/api");
        assert_eq!(config.rate_limit.max_retries, 3);
        assert_eq!(config.polling.interval_ms, 2000);
        assert_eq!(config.estimator.tier_base_s.get(Tier::Fantasy), 50);
        // untouched tiers keep their defaults
        assert_eq!(config.estimator.tier_base_s.get(Tier::Modern), 25);
        // untouched fields within a section keep their defaults
        assert_eq!(config.rate_limit.tick_interval_ms, 1000);
    }

    #[test]
    fn test_load_from_str_invalid_toml_returns_parse_error() {
        let result = load_from_str("not valid toml [[[", "bad.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_str_unknown_enum_value_returns_parse_error() {
        let result = load_from_str("[service]\nenvironment = \"staging\"\n", "env.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_str_validation_failure_returns_validation_error() {
        let result = load_from_str("[rate_limit]\nmax_retries = 0\n", "zero.toml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("rate_limit.max_retries"));
    }

    #[test]
    fn test_load_from_str_reports_each_violation_on_its_own_line() {
        let err = load_from_str(
            "[rate_limit]\nmax_retries = 0\n[polling]\ninterval_ms = 10\n",
            "two.toml",
        )
        .unwrap_err();
        let ConfigError::Validation(report) = err else {
            panic!("expected a validation error");
        };
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 2, "{report}");
        assert!(lines[0].contains("rate_limit.max_retries"));
        assert!(lines[1].contains("polling.interval_ms"));
    }

    #[test]
    fn test_load_from_str_source_name_appears_in_error() {
        let err = load_from_str("invalid [[[", "my-source.toml").unwrap_err();
        assert!(err.to_string().contains("my-source.toml"));
    }

    #[test]
    fn test_load_from_file_valid_toml_succeeds() {
        let dir = tempfile::tempdir().expect("test: create tempdir");
        let path = dir.path().join("orchestrator.toml");
        std::fs::write(&path, VALID_TOML).expect("test: write");

        let config = load_from_file(&path).expect("test: load from file");
        assert_eq!(config.rate_limit.base_delay_ms, 1000);
    }

    #[test]
    fn test_load_from_file_missing_file_returns_io_error() {
        let result = load_from_file(Path::new("/nonexistent/path/orchestrator.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::Io { .. }));
    }
}
