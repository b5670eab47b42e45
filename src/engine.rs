/// Pacing engine for one course and target time.
///
/// Owns the optimal pace model, the interval table and the cached partition
/// layers. Re-querying with a different number of paces reuses every layer that
/// was already filled; nothing here is shared between engines.
use std::sync::atomic::AtomicBool;

use tracing::{debug, info};

use crate::backtrack::{backtrack_boundaries, plan_from_boundaries, PacingPlan};
use crate::config::{PlannerConfig, Strategy};
use crate::course::CourseProfile;
use crate::error::{PacingError, Result};
use crate::pace_model::OptimalPaceModel;
use crate::pace_table::WeightedPaceTable;
use crate::partition::PartitionTable;
use crate::segmenting::{hill_boundaries, single_leg_boundaries, unit_marker_boundaries};
use crate::units::DistanceUnit;

/// Allowed gap between a plan's finish time and the target, in minutes.
const TIME_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct PacingEngine {
    course: CourseProfile,
    config: PlannerConfig,
    model: OptimalPaceModel,
    table: WeightedPaceTable,
    partition: PartitionTable,
    plan: Option<PacingPlan>,
}

impl PacingEngine {
    pub fn new(course: CourseProfile, config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        let model = OptimalPaceModel::new(course.grades(), course.lengths(), config.target_time)?;
        let table = WeightedPaceTable::build(model.optimal_paces(), course.lengths(), config.loss_metric)?;
        let partition = PartitionTable::new(&table, config.min_leg_length)?;

        info!(
            course = %course.name,
            segments = course.n_segments(),
            distance_mi = course.total_distance(),
            base_pace = model.base_pace(),
            "prepared pacing engine"
        );

        Ok(PacingEngine {
            course,
            config,
            model,
            table,
            partition,
            plan: None,
        })
    }

    pub fn course(&self) -> &CourseProfile {
        &self.course
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn model(&self) -> &OptimalPaceModel {
        &self.model
    }

    pub fn optimal_paces(&self) -> &[f64] {
        self.model.optimal_paces()
    }

    pub fn weighted_table(&self) -> &WeightedPaceTable {
        &self.table
    }

    pub fn partition(&self) -> &PartitionTable {
        &self.partition
    }

    pub fn total_paces(&self) -> usize {
        self.config.total_paces
    }

    /// Switches the requested number of legs. Cached layers are kept; only the
    /// produced plan is discarded.
    pub fn change_total_paces(&mut self, total_paces: usize) -> Result<()> {
        if total_paces == 0 {
            return Err(PacingError::domain("total paces must be at least 1"));
        }
        if total_paces != self.config.total_paces {
            debug!(from = self.config.total_paces, to = total_paces, "changing total paces");
            self.config.total_paces = total_paces;
            self.plan = None;
        }
        Ok(())
    }

    pub fn solve(&mut self) -> Result<PacingPlan> {
        self.solve_inner(None)
    }

    /// Solves, giving up between partition layers once `cancel` is set.
    pub fn solve_with_cancel(&mut self, cancel: &AtomicBool) -> Result<PacingPlan> {
        self.solve_inner(Some(cancel))
    }

    /// Least achievable loss over the whole course with `legs` legs.
    pub fn minimal_loss(&mut self, legs: usize) -> Result<f64> {
        self.check_feasible(legs)?;
        self.partition.ensure_legs(legs)?;
        self.partition.root_loss(legs).ok_or(PacingError::InfeasiblePartition {
            segments: self.course.n_segments(),
            legs,
            min_leg_length: self.config.min_leg_length,
        })
    }

    fn solve_inner(&mut self, cancel: Option<&AtomicBool>) -> Result<PacingPlan> {
        if let Some(plan) = &self.plan {
            return Ok(plan.clone());
        }

        let boundaries = match self.config.strategy {
            Strategy::Optimal => {
                let legs = self.config.total_paces;
                self.check_feasible(legs)?;
                self.partition.ensure_legs_with_cancel(legs, cancel)?;
                backtrack_boundaries(&self.partition, legs)?
            }
            Strategy::AveragePace => single_leg_boundaries(),
            Strategy::PerMile => unit_marker_boundaries(&self.course, DistanceUnit::Mile),
            Strategy::PerKilometer => unit_marker_boundaries(&self.course, DistanceUnit::Kilometer),
            Strategy::HillDetection => hill_boundaries(&self.course),
        };

        let plan = plan_from_boundaries(boundaries, &self.table, &self.course)?;
        let total_time = plan.total_time();
        let allowed = TIME_TOLERANCE * self.config.target_time.max(1.0);
        if (total_time - self.config.target_time).abs() > allowed {
            return Err(PacingError::InvariantViolation(format!(
                "plan finishes in {:.9} minutes instead of {:.9}",
                total_time, self.config.target_time
            )));
        }

        info!(
            course = %self.course.name,
            strategy = ?self.config.strategy,
            legs = plan.legs(),
            loss = plan.total_loss,
            "produced pacing plan"
        );
        self.plan = Some(plan.clone());
        Ok(plan)
    }

    fn check_feasible(&self, legs: usize) -> Result<()> {
        if legs == 0 {
            return Err(PacingError::domain("total paces must be at least 1"));
        }
        let needed = legs.checked_mul(self.config.min_leg_length);
        if needed.map_or(true, |needed| needed > self.course.n_segments()) {
            return Err(PacingError::InfeasiblePartition {
                segments: self.course.n_segments(),
                legs,
                min_leg_length: self.config.min_leg_length,
            });
        }
        Ok(())
    }
}

/// One-shot convenience: builds an engine and solves it once.
pub fn plan_course(course: CourseProfile, config: PlannerConfig) -> Result<PacingPlan> {
    PacingEngine::new(course, config)?.solve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LossMetric;
    use approx::assert_abs_diff_eq;

    fn short_hill() -> CourseProfile {
        CourseProfile::new("hill", vec![1.0; 6], vec![0.0, 0.0, 10.0, 10.0, 0.0, 0.0]).unwrap()
    }

    #[test]
    fn test_single_leg_runs_average_pace() {
        let plan = plan_course(short_hill(), PlannerConfig::new(60.0, 1)).unwrap();
        assert_eq!(plan.boundaries, vec![0]);
        assert_abs_diff_eq!(plan.leg_pace[0], 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(plan.total_loss, 16.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_change_total_paces_reuses_layers() {
        let config = PlannerConfig::new(60.0, 3).with_min_leg_length(1);
        let mut engine = PacingEngine::new(short_hill(), config).unwrap();
        engine.solve().unwrap();
        assert_eq!(engine.partition().computed_legs(), 3);

        engine.change_total_paces(2).unwrap();
        let two = engine.solve().unwrap();
        assert_eq!(engine.partition().computed_legs(), 3);
        assert_eq!(two.boundaries, vec![0, 2]);

        engine.change_total_paces(5).unwrap();
        let five = engine.solve().unwrap();
        assert_eq!(engine.partition().computed_legs(), 5);
        assert_eq!(five.legs(), 5);
    }

    #[test]
    fn test_repeated_solves_are_identical() {
        let mut engine = PacingEngine::new(short_hill(), PlannerConfig::new(60.0, 2).with_min_leg_length(1)).unwrap();
        let first = engine.solve().unwrap();
        let second = engine.solve().unwrap();
        assert_eq!(first, second);

        let fresh = plan_course(short_hill(), PlannerConfig::new(60.0, 2).with_min_leg_length(1)).unwrap();
        assert_eq!(
            first.leg_pace.iter().map(|p| p.to_bits()).collect::<Vec<_>>(),
            fresh.leg_pace.iter().map(|p| p.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_too_many_legs_is_infeasible() {
        let mut engine = PacingEngine::new(short_hill(), PlannerConfig::new(60.0, 3)).unwrap();
        assert!(matches!(
            engine.solve(),
            Err(PacingError::InfeasiblePartition { segments: 6, legs: 3, min_leg_length: 3 })
        ));
        assert!(matches!(engine.minimal_loss(0), Err(PacingError::Domain(_))));
        assert!(engine.change_total_paces(0).is_err());
    }

    #[test]
    fn test_cancelled_solve_can_resume() {
        let config = PlannerConfig::new(60.0, 4).with_min_leg_length(1);
        let mut engine = PacingEngine::new(short_hill(), config).unwrap();
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            engine.solve_with_cancel(&cancel),
            Err(PacingError::Cancelled { completed_layers: 1 })
        ));
        let plan = engine.solve().unwrap();
        assert_eq!(plan.legs(), 4);
    }

    #[test]
    fn test_fixed_layout_strategies() {
        let course = CourseProfile::new("flat", vec![0.25; 10], vec![1.0; 10]).unwrap();
        let per_mile = plan_course(course.clone(), PlannerConfig::new(20.0, 1).with_strategy(Strategy::PerMile)).unwrap();
        assert_eq!(per_mile.boundaries, vec![0, 4, 8]);
        assert_abs_diff_eq!(per_mile.total_time(), 20.0, epsilon = 1e-9);

        let average = plan_course(course, PlannerConfig::new(20.0, 7).with_strategy(Strategy::AveragePace)).unwrap();
        assert_eq!(average.boundaries, vec![0]);
        assert_abs_diff_eq!(average.leg_pace[0], 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_absolute_metric_engine() {
        let config = PlannerConfig::new(60.0, 2)
            .with_min_leg_length(1)
            .with_loss_metric(LossMetric::Absolute);
        let plan = plan_course(short_hill(), config).unwrap();
        assert_eq!(plan.boundaries, vec![0, 2]);
        // two segments 1 min/mi off their leg pace each way
        assert_abs_diff_eq!(plan.total_loss, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_hill_detection_strategy() {
        let mut grades = vec![-0.5; 40];
        grades[10..20].fill(5.0);
        let course = CourseProfile::new("climb", vec![0.05; 40], grades).unwrap();
        let plan = plan_course(course, PlannerConfig::new(25.0, 9).with_strategy(Strategy::HillDetection)).unwrap();
        assert_eq!(plan.boundaries, vec![0, 10, 20]);
        assert!(plan.leg_pace[1] > plan.leg_pace[0]);
        assert_abs_diff_eq!(plan.total_time(), 25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_oversized_min_leg_is_infeasible() {
        let config = PlannerConfig::new(60.0, 1).with_min_leg_length(usize::MAX);
        let err = plan_course(short_hill(), config).unwrap_err();
        assert!(matches!(
            err,
            PacingError::InfeasiblePartition { segments: 6, legs: 1, min_leg_length: usize::MAX }
        ));
    }
}
