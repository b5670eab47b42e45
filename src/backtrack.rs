/// Recovers leg boundaries from the partition table and turns them into a plan.
use serde::{Deserialize, Serialize};

use crate::course::CourseProfile;
use crate::error::{PacingError, Result};
use crate::pace_table::WeightedPaceTable;
use crate::partition::PartitionTable;

/// A complete pacing plan: `k` legs, each run at one constant pace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacingPlan {
    /// First segment of each leg; starts at 0 and strictly increases.
    pub boundaries: Vec<usize>,
    /// Minutes per mile for each leg.
    pub leg_pace: Vec<f64>,
    /// Miles covered by each leg.
    pub leg_length: Vec<f64>,
    /// Minutes spent on each leg.
    pub leg_time: Vec<f64>,
    /// Each leg's pace repeated over its segments.
    pub per_segment_pace: Vec<f64>,
    /// Sum of the interval losses of the chosen legs.
    pub total_loss: f64,
}

impl PacingPlan {
    pub fn legs(&self) -> usize {
        self.boundaries.len()
    }

    pub fn total_time(&self) -> f64 {
        self.leg_time.iter().sum()
    }

    pub fn total_distance(&self) -> f64 {
        self.leg_length.iter().sum()
    }

    /// Half-open segment range `[start, end)` of `leg`.
    pub fn leg_range(&self, leg: usize) -> (usize, usize) {
        let start = self.boundaries[leg];
        let end = self
            .boundaries
            .get(leg + 1)
            .copied()
            .unwrap_or(self.per_segment_pace.len());
        (start, end)
    }
}

/// Walks the split choices of `dp` for a `legs`-leg plan over the whole course.
///
/// Uses an explicit stack so long courses cannot exhaust the call stack.
pub fn backtrack_boundaries(dp: &PartitionTable, legs: usize) -> Result<Vec<usize>> {
    let n = dp.n_segments();
    if legs == 0 {
        return Err(PacingError::domain("a plan needs at least one leg"));
    }
    if dp.root_loss(legs).is_none() {
        return Err(PacingError::InfeasiblePartition {
            segments: n,
            legs,
            min_leg_length: dp.min_leg_length(),
        });
    }

    let mut boundaries = Vec::with_capacity(legs);
    let mut stack = vec![(0usize, legs - 1)];
    while let Some((start, changes)) = stack.pop() {
        boundaries.push(start);
        if changes > 0 {
            let split = dp.split(start, n, changes).ok_or_else(|| {
                PacingError::InvariantViolation(format!(
                    "no split recorded for [{}, {}) with {} changes",
                    start, n, changes
                ))
            })?;
            stack.push((split, changes - 1));
        }
    }

    boundaries.sort_unstable();
    boundaries.dedup();
    if boundaries.len() != legs {
        return Err(PacingError::InvariantViolation(format!(
            "recovered {} boundaries for a {}-leg plan",
            boundaries.len(),
            legs
        )));
    }
    Ok(boundaries)
}

/// Builds leg paces, lengths and times for the given leg starts.
pub fn plan_from_boundaries(
    boundaries: Vec<usize>,
    table: &WeightedPaceTable,
    course: &CourseProfile,
) -> Result<PacingPlan> {
    let n = course.n_segments();
    if table.n_segments() != n {
        return Err(PacingError::domain(format!(
            "pace table covers {} segments but the course has {}",
            table.n_segments(),
            n
        )));
    }
    if boundaries.first() != Some(&0) {
        return Err(PacingError::InvariantViolation(
            "first leg must start at segment 0".to_string(),
        ));
    }
    if boundaries.windows(2).any(|w| w[0] >= w[1]) || boundaries.last().is_some_and(|&b| b >= n) {
        return Err(PacingError::InvariantViolation(format!(
            "leg boundaries {:?} are not strictly increasing within {} segments",
            boundaries, n
        )));
    }

    let legs = boundaries.len();
    let mut leg_pace = Vec::with_capacity(legs);
    let mut leg_length = Vec::with_capacity(legs);
    let mut leg_time = Vec::with_capacity(legs);
    let mut per_segment_pace = vec![0.0; n];
    let mut total_loss = 0.0;

    for (leg, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(leg + 1).copied().unwrap_or(n);
        let pace = table.weighted_pace(start, end)?;
        let length = course.end_distance(end - 1) - course.start_distance(start);
        total_loss += table.base_loss(start, end)?;

        per_segment_pace[start..end].fill(pace);
        leg_pace.push(pace);
        leg_length.push(length);
        leg_time.push(pace * length);
    }

    Ok(PacingPlan {
        boundaries,
        leg_pace,
        leg_length,
        leg_time,
        per_segment_pace,
        total_loss,
    })
}
