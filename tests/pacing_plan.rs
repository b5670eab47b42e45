use approx::assert_abs_diff_eq;
use race_pacer::{
    plan_course, CourseProfile, LossMetric, PacingEngine, PacingError, PlannerConfig, Strategy,
};

fn short_hill() -> CourseProfile {
    CourseProfile::new("hill", vec![1.0; 6], vec![0.0, 0.0, 10.0, 10.0, 0.0, 0.0]).unwrap()
}

/// Rolling course with uneven segment lengths.
fn rolling_course(n: usize) -> CourseProfile {
    let lengths: Vec<f64> = (0..n).map(|i| 0.08 + 0.03 * ((i * 7) % 5) as f64).collect();
    let grades: Vec<f64> = (0..n)
        .map(|i| 6.0 * (i as f64 * 0.21).sin() + 2.0 * (i as f64 * 0.9).cos())
        .collect();
    CourseProfile::new("rolling", lengths, grades).unwrap()
}

fn check_invariants(course: &CourseProfile, config: &PlannerConfig) {
    let plan = plan_course(course.clone(), config.clone()).unwrap();
    let n = course.n_segments();

    assert_abs_diff_eq!(plan.total_time(), config.target_time, epsilon = 1e-6);
    assert_abs_diff_eq!(plan.total_distance(), course.total_distance(), epsilon = 1e-9);
    assert_eq!(plan.boundaries[0], 0);
    assert_eq!(plan.legs(), config.total_paces);
    assert!(plan.boundaries.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(plan.per_segment_pace.len(), n);

    for leg in 0..plan.legs() {
        let (start, end) = plan.leg_range(leg);
        assert!(end - start >= config.min_leg_length);
        for s in start..end {
            assert_eq!(plan.per_segment_pace[s], plan.leg_pace[leg]);
        }
    }
}

#[test]
fn concrete_two_leg_example() {
    let mut engine = PacingEngine::new(short_hill(), PlannerConfig::new(60.0, 2).with_min_leg_length(1)).unwrap();

    let base = 56.0 / 6.0;
    let expected = [base, base, base + 2.0, base + 2.0, base, base];
    for (got, want) in engine.optimal_paces().iter().zip(expected) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
    }

    let plan = engine.solve().unwrap();
    assert_eq!(plan.boundaries, vec![0, 2]);
    assert_abs_diff_eq!(plan.leg_pace[0], base, epsilon = 1e-9);
    assert_abs_diff_eq!(plan.leg_pace[1], base + 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(plan.total_loss, 4.0, epsilon = 1e-9);

    engine.change_total_paces(1).unwrap();
    let single = engine.solve().unwrap();
    assert_abs_diff_eq!(single.leg_pace[0], 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(single.total_loss, 16.0 / 3.0, epsilon = 1e-9);
}

#[test]
fn plans_keep_time_coverage_and_leg_length() {
    let course = rolling_course(90);
    for legs in [1, 2, 5, 9] {
        for min_leg in [1, 3, 7] {
            for metric in [LossMetric::Square, LossMetric::Absolute] {
                let config = PlannerConfig::new(47.5, legs)
                    .with_min_leg_length(min_leg)
                    .with_loss_metric(metric);
                check_invariants(&course, &config);
            }
        }
    }
}

#[test]
fn one_leg_runs_the_weighted_mean_pace() {
    let course = rolling_course(40);
    let plan = plan_course(course.clone(), PlannerConfig::new(30.0, 1)).unwrap();
    assert_abs_diff_eq!(plan.leg_pace[0], 30.0 / course.total_distance(), epsilon = 1e-9);
}

#[test]
fn one_segment_legs_lose_nothing() {
    let course = rolling_course(25);
    let plan = plan_course(course, PlannerConfig::new(20.0, 25).with_min_leg_length(1)).unwrap();
    assert_eq!(plan.total_loss, 0.0);
    assert_eq!(plan.boundaries, (0..25).collect::<Vec<_>>());
}

#[test]
fn infeasible_leg_count_is_reported() {
    let course = rolling_course(20);
    let err = plan_course(course, PlannerConfig::new(20.0, 7)).unwrap_err();
    assert!(matches!(
        err,
        PacingError::InfeasiblePartition { segments: 20, legs: 7, min_leg_length: 3 }
    ));
}

#[test]
fn invalid_inputs_are_domain_errors() {
    assert!(matches!(
        plan_course(short_hill(), PlannerConfig::new(-5.0, 2)),
        Err(PacingError::Domain(_))
    ));
    assert!(matches!(
        plan_course(short_hill(), PlannerConfig::new(60.0, 0)),
        Err(PacingError::Domain(_))
    ));
}

#[test]
fn what_if_reuses_cached_layers() {
    let course = rolling_course(60);
    let mut engine = PacingEngine::new(course.clone(), PlannerConfig::new(45.0, 8)).unwrap();
    let eight = engine.solve().unwrap();
    let cells = engine.partition().layers().cell_count();

    engine.change_total_paces(4).unwrap();
    let four = engine.solve().unwrap();
    assert_eq!(engine.partition().layers().cell_count(), cells);

    engine.change_total_paces(8).unwrap();
    assert_eq!(engine.solve().unwrap(), eight);

    let fresh = plan_course(course, PlannerConfig::new(45.0, 4)).unwrap();
    assert_eq!(four, fresh);
}

#[test]
fn minimal_loss_never_grows_with_more_legs() {
    // equal lengths with one-segment legs allowed
    let grades: Vec<f64> = (0..36).map(|i| 5.0 * (i as f64 * 0.35).sin()).collect();
    let course = CourseProfile::new("even", vec![0.2; 36], grades).unwrap();
    let mut engine = PacingEngine::new(course, PlannerConfig::new(60.0, 1).with_min_leg_length(1)).unwrap();
    let mut previous = f64::INFINITY;
    for legs in 1..=36 {
        let loss = engine.minimal_loss(legs).unwrap();
        assert!(loss <= previous + 1e-8);
        previous = loss;
    }
    assert_eq!(previous, 0.0);
}

#[test]
fn optimal_beats_fixed_layouts_with_the_same_leg_count() {
    let course = rolling_course(120);
    let per_mile = plan_course(
        course.clone(),
        PlannerConfig::new(100.0, 1).with_strategy(Strategy::PerMile).with_min_leg_length(1),
    )
    .unwrap();
    let optimal = plan_course(
        course,
        PlannerConfig::new(100.0, per_mile.legs()).with_min_leg_length(1),
    )
    .unwrap();
    assert!(optimal.total_loss <= per_mile.total_loss + 1e-6);
    assert_abs_diff_eq!(per_mile.total_time(), 100.0, epsilon = 1e-6);
}

#[test]
fn separate_engines_run_in_parallel() {
    use rayon::prelude::*;
    let plans: Vec<_> = (0..4)
        .into_par_iter()
        .map(|i| plan_course(rolling_course(50 + i), PlannerConfig::new(40.0, 4)).unwrap())
        .collect();
    for (i, plan) in plans.iter().enumerate() {
        assert_eq!(plan.per_segment_pace.len(), 50 + i);
    }
}
