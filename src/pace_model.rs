/// Grade-adjusted target pace per segment.
///
/// Uphill running costs 12 seconds per mile for each percent of grade while
/// downhill running saves only 7. The base pace is solved so that running every
/// segment at its adjusted pace finishes exactly on the target time.
use crate::error::{PacingError, Result};

/// Seconds per mile lost per percent of uphill grade.
pub const UPHILL_SECONDS_PER_GRADE: f64 = 12.0;
/// Seconds per mile gained per percent of downhill grade.
pub const DOWNHILL_SECONDS_PER_GRADE: f64 = 7.0;

/// Pace adjustment in minutes per mile for a grade in percent.
pub fn grade_adjustment(grade: f64) -> f64 {
    if grade > 0.0 {
        UPHILL_SECONDS_PER_GRADE * grade.abs() / 60.0
    } else {
        -DOWNHILL_SECONDS_PER_GRADE * grade.abs() / 60.0
    }
}

#[derive(Debug, Clone)]
pub struct OptimalPaceModel {
    base_pace: f64,
    adjustments: Vec<f64>,
    optimal_paces: Vec<f64>,
}

impl OptimalPaceModel {
    pub fn new(grades: &[f64], lengths: &[f64], target_time: f64) -> Result<Self> {
        if grades.len() != lengths.len() {
            return Err(PacingError::domain(format!(
                "{} grades but {} segment lengths",
                grades.len(),
                lengths.len()
            )));
        }
        if !target_time.is_finite() || target_time <= 0.0 {
            return Err(PacingError::domain(format!(
                "target time must be positive, got {}",
                target_time
            )));
        }
        let total_distance: f64 = lengths.iter().sum();
        if total_distance <= 0.0 {
            return Err(PacingError::domain("course has zero total distance"));
        }

        let adjustments: Vec<f64> = grades.iter().map(|&g| grade_adjustment(g)).collect();
        let adjusted_time: f64 = adjustments
            .iter()
            .zip(lengths)
            .map(|(adj, len)| adj * len)
            .sum();
        let base_pace = (target_time - adjusted_time) / total_distance;
        let optimal_paces = adjustments.iter().map(|adj| base_pace + adj).collect();

        Ok(OptimalPaceModel {
            base_pace,
            adjustments,
            optimal_paces,
        })
    }

    pub fn base_pace(&self) -> f64 {
        self.base_pace
    }

    pub fn adjustments(&self) -> &[f64] {
        &self.adjustments
    }

    pub fn optimal_paces(&self) -> &[f64] {
        &self.optimal_paces
    }

    /// Finish time when every segment is run at its optimal pace.
    pub fn total_time(&self, lengths: &[f64]) -> f64 {
        self.optimal_paces
            .iter()
            .zip(lengths)
            .map(|(pace, len)| pace * len)
            .sum()
    }
}
