/// Plan rendering: leg tables, distance splits, text reports and
/// JSON / CSV / GeoJSON files.
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use csv::Writer;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::backtrack::PacingPlan;
use crate::config::PlannerConfig;
use crate::course::CourseProfile;
use crate::error::{PacingError, Result};
use crate::units::{pace_display_text, DistanceUnit};

/// Distances closer than this to a unit marker close the split.
const SPLIT_EPSILON_MI: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegRow {
    pub leg: usize,
    pub start_segment: usize,
    pub start_mi: f64,
    pub pace: f64,
    pub pace_text: String,
    pub length_mi: f64,
    pub time: f64,
    pub elapsed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitRow {
    pub split: usize,
    /// Distance of this split in the split unit; below 1 only for the final partial split.
    pub distance: f64,
    pub time: f64,
    pub pace: f64,
    pub pace_text: String,
    pub elapsed: f64,
}

#[derive(Debug, Serialize)]
struct SegmentRow {
    segment: usize,
    start_mi: f64,
    length_mi: f64,
    grade_pct: f64,
    pace: f64,
    time: f64,
}

#[derive(Debug, Serialize)]
pub struct PlanDocument<'a> {
    pub generated_at: DateTime<Utc>,
    pub course: &'a str,
    pub distance_mi: f64,
    pub config: &'a PlannerConfig,
    pub total_time: f64,
    pub total_loss: f64,
    pub boundaries: &'a [usize],
    pub legs: Vec<LegRow>,
    pub split_unit: DistanceUnit,
    pub splits: Vec<SplitRow>,
}

pub fn leg_rows(plan: &PacingPlan, course: &CourseProfile) -> Vec<LegRow> {
    let mut elapsed = 0.0;
    (0..plan.legs())
        .map(|leg| {
            let start = plan.boundaries[leg];
            elapsed += plan.leg_time[leg];
            LegRow {
                leg: leg + 1,
                start_segment: start,
                start_mi: course.start_distance(start),
                pace: plan.leg_pace[leg],
                pace_text: pace_display_text(plan.leg_pace[leg]),
                length_mi: plan.leg_length[leg],
                time: plan.leg_time[leg],
                elapsed,
            }
        })
        .collect()
}

/// Time and pace for every whole mile or kilometer, plus the partial tail.
pub fn distance_splits(plan: &PacingPlan, course: &CourseProfile, unit: DistanceUnit) -> Vec<SplitRow> {
    let unit_mi = unit.in_miles();
    let mut splits = Vec::new();
    let mut covered = 0.0;
    let mut time = 0.0;
    let mut elapsed = 0.0;

    let close = |covered: f64, time: f64, elapsed: &mut f64, splits: &mut Vec<SplitRow>| {
        *elapsed += time;
        let distance = covered / unit_mi;
        let pace = time / distance;
        splits.push(SplitRow {
            split: splits.len() + 1,
            distance,
            time,
            pace,
            pace_text: pace_display_text(pace),
            elapsed: *elapsed,
        });
    };

    for (&length, &pace) in course.lengths().iter().zip(&plan.per_segment_pace) {
        let mut remaining = length;
        while remaining > 0.0 {
            let take = remaining.min(unit_mi - covered);
            covered += take;
            time += take * pace;
            remaining -= take;
            if unit_mi - covered <= SPLIT_EPSILON_MI {
                close(unit_mi, time, &mut elapsed, &mut splits);
                covered = 0.0;
                time = 0.0;
            }
        }
    }
    if covered > SPLIT_EPSILON_MI {
        close(covered, time, &mut elapsed, &mut splits);
    }
    splits
}

/// `h:mm:ss` for an hour or more, `m:ss` otherwise.
pub fn duration_text(minutes: f64) -> String {
    let total = (minutes * 60.0).round().max(0.0) as u64;
    let (hours, mins, secs) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

pub fn render_leg_text(plan: &PacingPlan, course: &CourseProfile, target_time: f64) -> String {
    let mut out = format!("{}: {} minute plan\n", course.name, target_time);
    for row in leg_rows(plan, course) {
        out.push_str(&format!(
            "Leg {:>2}  from {:>6.2} mi  {:>6} /mile  for {:>5.2} mi  ({} elapsed {})\n",
            row.leg,
            row.start_mi,
            row.pace_text,
            row.length_mi,
            duration_text(row.time),
            duration_text(row.elapsed)
        ));
    }
    out.push_str(&format!("Total time: {}\n", duration_text(plan.total_time())));
    out
}

pub fn render_split_text(splits: &[SplitRow], unit: DistanceUnit) -> String {
    let mut out = String::new();
    for row in splits {
        let label = if (row.distance - 1.0).abs() < 1e-9 {
            format!("{} {}", row.split, unit.label())
        } else {
            format!("{} {} ({:.2})", row.split, unit.label(), row.distance)
        };
        out.push_str(&format!(
            "{:<14} {:>6} {}  split {}  elapsed {}\n",
            label,
            row.pace_text,
            unit.pace_label(),
            duration_text(row.time),
            duration_text(row.elapsed)
        ));
    }
    out
}

pub fn plan_document<'a>(
    plan: &'a PacingPlan,
    course: &'a CourseProfile,
    config: &'a PlannerConfig,
    split_unit: DistanceUnit,
) -> PlanDocument<'a> {
    PlanDocument {
        generated_at: Utc::now(),
        course: &course.name,
        distance_mi: course.total_distance(),
        config,
        total_time: plan.total_time(),
        total_loss: plan.total_loss,
        boundaries: &plan.boundaries,
        legs: leg_rows(plan, course),
        split_unit,
        splits: distance_splits(plan, course, split_unit),
    }
}

pub fn write_plan_json(path: &Path, document: &PlanDocument<'_>) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, document)?;
    info!(file = %path.display(), "wrote plan JSON");
    Ok(())
}

pub fn write_legs_csv(path: &Path, rows: &[LegRow]) -> Result<()> {
    let mut wtr = Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    info!(file = %path.display(), legs = rows.len(), "wrote leg table");
    Ok(())
}

pub fn write_segments_csv(path: &Path, plan: &PacingPlan, course: &CourseProfile) -> Result<()> {
    let mut wtr = Writer::from_path(path)?;
    for (segment, &pace) in plan.per_segment_pace.iter().enumerate() {
        let length_mi = course.lengths()[segment];
        wtr.serialize(SegmentRow {
            segment,
            start_mi: course.start_distance(segment),
            length_mi,
            grade_pct: course.grades()[segment],
            pace,
            time: pace * length_mi,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// One `LineString` feature per leg carrying its pace.
pub fn plan_geojson(plan: &PacingPlan, course: &CourseProfile, loop_course: bool) -> Result<Value> {
    let points = course
        .points()
        .ok_or_else(|| PacingError::domain(format!("course '{}' has no track points", course.name)))?;

    let features: Vec<Value> = (0..plan.legs())
        .map(|leg| {
            let (start, end) = plan.leg_range(leg);
            let mut coordinates: Vec<[f64; 3]> = points[start..=end]
                .iter()
                .map(|p| [p.lon, p.lat, p.elevation_ft])
                .collect();
            if loop_course && leg + 1 == plan.legs() {
                let first = points[0];
                coordinates.push([first.lon, first.lat, first.elevation_ft]);
            }
            json!({
                "type": "Feature",
                "geometry": { "type": "LineString", "coordinates": coordinates },
                "properties": {
                    "leg": leg + 1,
                    "pace": plan.leg_pace[leg],
                    "pace_text": pace_display_text(plan.leg_pace[leg]),
                    "length_mi": plan.leg_length[leg],
                    "time": plan.leg_time[leg],
                },
            })
        })
        .collect();

    Ok(json!({ "type": "FeatureCollection", "features": features }))
}

/// Writes every output for one plan into `dir` as `<stem>_*.{json,csv,geojson}`.
pub fn write_plan_outputs(
    dir: &Path,
    stem: &str,
    plan: &PacingPlan,
    course: &CourseProfile,
    config: &PlannerConfig,
    split_unit: DistanceUnit,
    loop_course: bool,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let json_path = dir.join(format!("{}_plan.json", stem));
    write_plan_json(&json_path, &plan_document(plan, course, config, split_unit))?;
    written.push(json_path);

    let legs_path = dir.join(format!("{}_legs.csv", stem));
    write_legs_csv(&legs_path, &leg_rows(plan, course))?;
    written.push(legs_path);

    let segments_path = dir.join(format!("{}_segments.csv", stem));
    write_segments_csv(&segments_path, plan, course)?;
    written.push(segments_path);

    if course.points().is_some() {
        let geojson_path = dir.join(format!("{}_legs.geojson", stem));
        let writer = BufWriter::new(File::create(&geojson_path)?);
        serde_json::to_writer(writer, &plan_geojson(plan, course, loop_course)?)?;
        written.push(geojson_path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::TrackPoint;
    use crate::engine::plan_course;
    use approx::assert_abs_diff_eq;

    fn short_hill() -> CourseProfile {
        CourseProfile::new("Hill", vec![1.0; 6], vec![0.0, 0.0, 10.0, 10.0, 0.0, 0.0]).unwrap()
    }

    fn two_leg_plan(course: &CourseProfile) -> PacingPlan {
        plan_course(course.clone(), PlannerConfig::new(60.0, 2).with_min_leg_length(1)).unwrap()
    }

    #[test]
    fn test_leg_rows_accumulate_elapsed_time() {
        let course = short_hill();
        let rows = leg_rows(&two_leg_plan(&course), &course);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].leg, 2);
        assert_eq!(rows[1].start_mi, 2.0);
        assert_eq!(rows[0].pace_text, "9:20");
        assert_abs_diff_eq!(rows[1].elapsed, 60.0, epsilon = 1e-9);
    }

    #[test]
    fn test_kilometer_splits_sum_to_total_time() {
        let course = short_hill();
        let plan = two_leg_plan(&course);
        let splits = distance_splits(&plan, &course, DistanceUnit::Kilometer);
        // 6 miles is 9.66 km
        assert_eq!(splits.len(), 10);
        assert!(splits[9].distance < 1.0);
        let total: f64 = splits.iter().map(|s| s.time).sum();
        assert_abs_diff_eq!(total, 60.0, epsilon = 1e-6);
        assert_abs_diff_eq!(splits[9].elapsed, 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_mile_splits_follow_segment_paces() {
        let course = short_hill();
        let plan = two_leg_plan(&course);
        let splits = distance_splits(&plan, &course, DistanceUnit::Mile);
        assert_eq!(splits.len(), 6);
        assert_abs_diff_eq!(splits[0].pace, 56.0 / 6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(splits[5].pace, 56.0 / 6.0 + 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_leg_text_layout() {
        let course = short_hill();
        let text = render_leg_text(&two_leg_plan(&course), &course, 60.0);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Hill: 60 minute plan");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "Total time: 1:00:00");
        assert_eq!(duration_text(9.5), "9:30");
    }

    #[test]
    fn test_geojson_closes_loop() {
        let points: Vec<TrackPoint> = (0..7)
            .map(|i| TrackPoint { lat: 45.0 + i as f64 * 0.01, lon: -122.0, elevation_ft: 10.0 * i as f64 })
            .collect();
        let course = short_hill().with_points(points).unwrap();
        let plan = two_leg_plan(&course);

        let geojson = plan_geojson(&plan, &course, true).unwrap();
        let features = geojson["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["geometry"]["coordinates"].as_array().unwrap().len(), 3);
        let last = features[1]["geometry"]["coordinates"].as_array().unwrap();
        assert_eq!(last.len(), 6);
        assert_eq!(last[5][1].as_f64(), Some(45.0));

        assert!(matches!(plan_geojson(&plan, &short_hill(), false), Err(PacingError::Domain(_))));
    }

    #[test]
    fn test_writes_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let course = short_hill();
        let plan = two_leg_plan(&course);
        let config = PlannerConfig::new(60.0, 2).with_min_leg_length(1);
        let written =
            write_plan_outputs(dir.path(), "hill", &plan, &course, &config, DistanceUnit::Mile, false).unwrap();
        assert_eq!(written.len(), 3);

        let json: Value = serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(json["legs"].as_array().unwrap().len(), 2);
        assert_eq!(json["config"]["total_paces"], 2);

        let legs = fs::read_to_string(&written[1]).unwrap();
        assert!(legs.starts_with("leg,start_segment,start_mi,pace,pace_text"));
        assert_eq!(fs::read_to_string(&written[2]).unwrap().lines().count(), 7);
    }
}
