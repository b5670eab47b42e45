use serde::{Deserialize, Serialize};

use crate::error::{PacingError, Result};

/// Minimum number of segments a leg must span unless configured otherwise.
pub const DEFAULT_MIN_LEG_LENGTH: usize = 3;
/// Number of uniform segments a GPX track is resampled into.
pub const DEFAULT_COURSE_SEGMENTS: usize = 200;

/// Nonnegative metric applied to each segment's deviation from its leg pace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LossMetric {
    #[default]
    Square,
    Absolute,
}

impl LossMetric {
    pub fn apply(self, deviation: f64) -> f64 {
        match self {
            LossMetric::Square => deviation * deviation,
            LossMetric::Absolute => deviation.abs(),
        }
    }
}

/// How the course is cut into legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    /// Minimal-loss partition into exactly `total_paces` legs.
    #[default]
    Optimal,
    /// A single leg at the course's weighted optimal pace.
    AveragePace,
    /// One leg per mile.
    PerMile,
    /// One leg per kilometer.
    PerKilometer,
    /// Legs follow significant climbs and descents, with flat stretches in between.
    HillDetection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Finish time in minutes.
    pub target_time: f64,
    /// Number of legs (distinct paces) in the plan.
    pub total_paces: usize,
    pub min_leg_length: usize,
    pub loss_metric: LossMetric,
    pub strategy: Strategy,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            target_time: 240.0,
            total_paces: 5,
            min_leg_length: DEFAULT_MIN_LEG_LENGTH,
            loss_metric: LossMetric::Square,
            strategy: Strategy::Optimal,
        }
    }
}

impl PlannerConfig {
    pub fn new(target_time: f64, total_paces: usize) -> Self {
        PlannerConfig {
            target_time,
            total_paces,
            ..Default::default()
        }
    }

    pub fn with_min_leg_length(mut self, min_leg_length: usize) -> Self {
        self.min_leg_length = min_leg_length;
        self
    }

    pub fn with_loss_metric(mut self, loss_metric: LossMetric) -> Self {
        self.loss_metric = loss_metric;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.target_time.is_finite() || self.target_time <= 0.0 {
            return Err(PacingError::domain(format!(
                "target time must be positive, got {}",
                self.target_time
            )));
        }
        if self.total_paces == 0 {
            return Err(PacingError::domain("total paces must be at least 1"));
        }
        if self.min_leg_length == 0 {
            return Err(PacingError::domain("minimum leg length must be at least 1 segment"));
        }
        Ok(())
    }
}

/// Elevation smoothing applied to a resampled GPX track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SmoothingMethod {
    None,
    /// Moving average over `window_m` meters.
    Box { window_m: f64 },
    /// Gaussian kernel with `sigma` measured in samples.
    Gaussian { sigma: f64 },
    /// Zero-phase Butterworth low-pass removing features shorter than the wavelength.
    Butterworth { cutoff_wavelength_m: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseConfig {
    pub segments: usize,
    pub smoothing: SmoothingMethod,
}

impl Default for CourseConfig {
    fn default() -> Self {
        CourseConfig {
            segments: DEFAULT_COURSE_SEGMENTS,
            smoothing: SmoothingMethod::Gaussian { sigma: 1.0 },
        }
    }
}

impl CourseConfig {
    /// Resampling only, elevations kept as recorded.
    pub fn raw() -> Self {
        CourseConfig {
            smoothing: SmoothingMethod::None,
            ..Default::default()
        }
    }

    pub fn box_100m() -> Self {
        CourseConfig {
            smoothing: SmoothingMethod::Box { window_m: 100.0 },
            ..Default::default()
        }
    }

    pub fn butterworth() -> Self {
        CourseConfig {
            smoothing: SmoothingMethod::Butterworth {
                cutoff_wavelength_m: 200.0,
            },
            ..Default::default()
        }
    }

    pub fn with_segments(mut self, segments: usize) -> Self {
        self.segments = segments;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_planner_is_valid() {
        let config = PlannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_leg_length, 3);
        assert_eq!(config.loss_metric, LossMetric::Square);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(
            PlannerConfig::new(0.0, 3).validate(),
            Err(PacingError::Domain(_))
        ));
        assert!(matches!(
            PlannerConfig::new(60.0, 0).validate(),
            Err(PacingError::Domain(_))
        ));
        assert!(matches!(
            PlannerConfig::new(60.0, 2).with_min_leg_length(0).validate(),
            Err(PacingError::Domain(_))
        ));
    }

    #[test]
    fn test_metrics_are_nonnegative() {
        assert_eq!(LossMetric::Square.apply(-2.0), 4.0);
        assert_eq!(LossMetric::Absolute.apply(-2.0), 2.0);
    }
}
