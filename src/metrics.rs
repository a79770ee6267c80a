//! Prometheus metrics for remote calls, backoff and job outcomes.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup. The helper functions
//! (`inc_remote_call`, `set_backoff_delay`, …) are no-ops if `init_metrics`
//! was never called, so the library is always safe to use without it.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `render_remote_calls_total` | Counter | `operation`, `outcome` |
//! | `render_throttle_events_total` | Counter | — |
//! | `render_backoff_delay_ms` | Gauge | — |
//! | `render_jobs_total` | Counter | `outcome` |
//! | `render_poll_ticks_total` | Counter | — |

use crate::OrchestratorError;
use prometheus::{
    core::Collector, CounterVec, Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

// ── Internal metrics bundle ────────────────────────────────────────────────

/// All metrics, stored in a single [`OnceLock`] and initialised atomically.
pub struct Metrics {
    /// Registry owning every descriptor below.
    pub registry: Registry,
    /// Remote calls by operation (`submit`, `status`, `cancel`) and outcome.
    pub remote_calls: CounterVec,
    /// Throttle or network failures fed to the limiter.
    pub throttle_events: IntCounter,
    /// Current limiter delay.
    pub backoff_delay_ms: IntGauge,
    /// Jobs by final outcome.
    pub jobs_total: CounterVec,
    /// Status polls issued.
    pub poll_ticks: IntCounter,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

// ── Initialisation ─────────────────────────────────────────────────────────

fn register<C>(registry: &Registry, collector: C) -> Result<C, OrchestratorError>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| OrchestratorError::Other(format!("metrics registration failed: {e}")))?;
    Ok(collector)
}

fn build(registry: Registry, prefix: &str) -> Result<Metrics, OrchestratorError> {
    let init_err = |e: prometheus::Error| OrchestratorError::Other(format!("metrics init failed: {e}"));

    let remote_calls = CounterVec::new(
        Opts::new(
            format!("{prefix}_remote_calls_total"),
            "Remote calls by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .map_err(init_err)?;
    let remote_calls = register(&registry, remote_calls)?;

    let throttle_events = IntCounter::new(
        format!("{prefix}_throttle_events_total"),
        "Throttle or network failures that grew the backoff delay",
    )
    .map_err(init_err)?;
    let throttle_events = register(&registry, throttle_events)?;

    let backoff_delay_ms = IntGauge::new(
        format!("{prefix}_backoff_delay_ms"),
        "Current shared backoff delay in milliseconds",
    )
    .map_err(init_err)?;
    let backoff_delay_ms = register(&registry, backoff_delay_ms)?;

    let jobs_total = CounterVec::new(
        Opts::new(format!("{prefix}_jobs_total"), "Jobs by final outcome"),
        &["outcome"],
    )
    .map_err(init_err)?;
    let jobs_total = register(&registry, jobs_total)?;

    let poll_ticks = IntCounter::new(format!("{prefix}_poll_ticks_total"), "Status polls issued")
        .map_err(init_err)?;
    let poll_ticks = register(&registry, poll_ticks)?;

    Ok(Metrics {
        registry,
        remote_calls,
        throttle_events,
        backoff_delay_ms,
        jobs_total,
        poll_ticks,
    })
}

/// Initialise all metrics on a private registry.
///
/// Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`OrchestratorError::Other`] if metric construction or
/// registration fails.
pub fn init_metrics() -> Result<(), OrchestratorError> {
    if METRICS.get().is_some() {
        return Ok(());
    }
    let bundle = build(Registry::new(), "render")?;
    // A racing initialiser builds identical descriptors; first one wins.
    let _ = METRICS.set(bundle);
    Ok(())
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

// ── Public helper functions ────────────────────────────────────────────────

/// Count one remote call.
///
/// No-op if metrics have not been initialised.
pub fn inc_remote_call(operation: &str, outcome: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m
            .remote_calls
            .get_metric_with_label_values(&[operation, outcome])
        {
            c.inc();
        }
    }
}

/// Count one limiter backoff step.
pub fn inc_throttle_event() {
    if let Some(m) = metrics() {
        m.throttle_events.inc();
    }
}

/// Publish the limiter's current delay.
pub fn set_backoff_delay(delay_ms: u64) {
    if let Some(m) = metrics() {
        m.backoff_delay_ms
            .set(i64::try_from(delay_ms).unwrap_or(i64::MAX));
    }
}

/// Count one job reaching `outcome` (a terminal status or `submission_failed`).
pub fn inc_job_outcome(outcome: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.jobs_total.get_metric_with_label_values(&[outcome]) {
            c.inc();
        }
    }
}

/// Count one status poll.
pub fn inc_poll_tick() {
    if let Some(m) = metrics() {
        m.poll_ticks.inc();
    }
}

/// Encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails.
pub fn gather_metrics() -> String {
    let Some(m) = metrics() else {
        return String::new();
    };
    let families = m.registry.gather();
    let mut buffer = Vec::new();
    if TextEncoder::new().encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The global `METRICS` cannot be reset between tests, so exact-value
    /// checks run against a local bundle.
    fn make_test_metrics() -> Metrics {
        build(Registry::new(), "t").expect("test metrics must build")
    }

    fn counter_value(m: &Metrics, name: &str) -> f64 {
        let families = m.registry.gather();
        let family = families
            .iter()
            .find(|f| f.get_name() == name)
            .expect("family must exist");
        family.get_metric()[0].get_counter().get_value()
    }

    #[test]
    fn test_init_metrics_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok(), "second call must be a no-op");
    }

    #[test]
    fn test_helpers_before_or_after_init_do_not_panic() {
        inc_remote_call("status", "throttled");
        inc_throttle_event();
        set_backoff_delay(u64::MAX);
        inc_job_outcome("completed");
        inc_poll_tick();
    }

    #[test]
    fn test_remote_call_labels() {
        let m = make_test_metrics();
        m.remote_calls
            .get_metric_with_label_values(&["submit", "throttled"])
            .expect("label ok")
            .inc();
        m.remote_calls
            .get_metric_with_label_values(&["submit", "throttled"])
            .expect("label ok")
            .inc();
        let value = counter_value(&m, "t_remote_calls_total");
        assert!((value - 2.0).abs() < f64::EPSILON, "got {value}");
    }

    #[test]
    fn test_backoff_gauge_holds_last_value() {
        let m = make_test_metrics();
        m.backoff_delay_ms.set(120_000);
        m.backoff_delay_ms.set(80_000);
        assert_eq!(m.backoff_delay_ms.get(), 80_000);
    }

    #[test]
    fn test_gather_metrics_exposes_render_prefix_after_init() {
        let _ = init_metrics();
        inc_poll_tick();
        let text = gather_metrics();
        assert!(text.contains("render_poll_ticks_total"), "{text}");
    }
}
