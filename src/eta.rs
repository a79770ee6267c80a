//! Tier/queue ETA estimation.
//!
//! Pure arithmetic over the [`EstimatorConfig`] table. The estimator owns no
//! timer: the orchestrator asks for one estimate at submission time and the
//! caller re-derives [`EtaEstimator::progress_fraction`] from its own elapsed
//! counter.

use std::time::Duration;

use crate::config::EstimatorConfig;
use crate::Tier;

/// Time estimates for render jobs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EtaEstimator {
    config: EstimatorConfig,
}

impl EtaEstimator {
    /// Create an estimator over `config`.
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Base processing seconds for `tier`.
    pub fn tier_base(&self, tier: Tier) -> u64 {
        self.config.tier_base_s.get(tier)
    }

    /// Total expected seconds: tier base plus queue wait.
    pub fn estimate(&self, tier: Tier, queue_position: u32) -> u64 {
        self.tier_base(tier).saturating_add(
            u64::from(queue_position).saturating_mul(self.config.queue_delay_per_position_s),
        )
    }

    /// [`estimate`](Self::estimate) as a [`Duration`].
    pub fn estimate_duration(&self, tier: Tier, queue_position: u32) -> Duration {
        Duration::from_secs(self.estimate(tier, queue_position))
    }

    /// Fraction of the tier's base time elapsed, clamped to `[0, 1]`.
    ///
    /// A zero tier base counts as already complete.
    pub fn progress_fraction(&self, elapsed_seconds: f64, tier: Tier) -> f64 {
        let base = self.tier_base(tier);
        if base == 0 {
            return 1.0;
        }
        if !elapsed_seconds.is_finite() {
            return if elapsed_seconds > 0.0 { 1.0 } else { 0.0 };
        }
        (elapsed_seconds / base as f64).clamp(0.0, 1.0)
    }
}

/// `m:ss`, minutes unpadded.
pub fn format_minutes_seconds(total_seconds: u64) -> String {
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierBaseSeconds;

    #[test]
    fn test_estimate_adds_thirty_seconds_per_queue_position() {
        let eta = EtaEstimator::default();
        assert_eq!(eta.estimate(Tier::Fantasy, 2), 105);
        assert_eq!(format_minutes_seconds(eta.estimate(Tier::Fantasy, 2)), "1:45");
    }

    #[test]
    fn test_estimate_with_empty_queue_is_tier_base() {
        let eta = EtaEstimator::default();
        assert_eq!(eta.estimate(Tier::Modern, 0), 25);
        assert_eq!(eta.estimate(Tier::Superhero, 0), 35);
        assert_eq!(eta.estimate(Tier::Fantasy, 0), 45);
        assert_eq!(eta.estimate(Tier::Cartoon, 0), 40);
    }

    #[test]
    fn test_estimate_saturates_on_huge_queue() {
        let eta = EtaEstimator::new(EstimatorConfig {
            queue_delay_per_position_s: u64::MAX,
            tier_base_s: TierBaseSeconds::default(),
        });
        assert_eq!(eta.estimate(Tier::Modern, u32::MAX), u64::MAX);
    }

    #[test]
    fn test_progress_fraction_clamps_to_one() {
        let eta = EtaEstimator::default();
        assert_eq!(eta.progress_fraction(50.0, Tier::Modern), 1.0);
    }

    #[test]
    fn test_progress_fraction_is_linear_below_base() {
        let eta = EtaEstimator::default();
        assert!((eta.progress_fraction(22.5, Tier::Fantasy) - 0.5).abs() < f64::EPSILON);
        assert_eq!(eta.progress_fraction(0.0, Tier::Cartoon), 0.0);
    }

    #[test]
    fn test_progress_fraction_clamps_negative_and_nan() {
        let eta = EtaEstimator::default();
        assert_eq!(eta.progress_fraction(-5.0, Tier::Modern), 0.0);
        assert_eq!(eta.progress_fraction(f64::NAN, Tier::Modern), 0.0);
        assert_eq!(eta.progress_fraction(f64::INFINITY, Tier::Modern), 1.0);
    }

    #[test]
    fn test_zero_tier_base_reports_complete() {
        let eta = EtaEstimator::new(EstimatorConfig {
            queue_delay_per_position_s: 30,
            tier_base_s: TierBaseSeconds {
                modern: 0,
                ..TierBaseSeconds::default()
            },
        });
        assert_eq!(eta.progress_fraction(0.0, Tier::Modern), 1.0);
    }

    #[test]
    fn test_format_minutes_seconds() {
        assert_eq!(format_minutes_seconds(0), "0:00");
        assert_eq!(format_minutes_seconds(59), "0:59");
        assert_eq!(format_minutes_seconds(60), "1:00");
        assert_eq!(format_minutes_seconds(605), "10:05");
    }
}
