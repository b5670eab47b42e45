/// Plans every GPX course in a folder and writes a summary table.
use std::fs;
use std::path::{Component, Path, PathBuf};

use csv::Writer;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::{CourseConfig, PlannerConfig};
use crate::engine::PacingEngine;
use crate::error::Result;
use crate::export::write_plan_outputs;
use crate::gpx_course::{clean_filename, load_gpx_course};
use crate::units::{pace_display_text, DistanceUnit};

pub const SUMMARY_FILE: &str = "pacing_summary.csv";

/// Finish time for each course in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TargetTime {
    /// Same finish time in minutes for every course.
    Minutes(f64),
    /// Average minutes per mile, scaled by each course's distance.
    PacePerMile(f64),
}

impl TargetTime {
    pub fn for_distance(self, miles: f64) -> f64 {
        match self {
            TargetTime::Minutes(minutes) => minutes,
            TargetTime::PacePerMile(pace) => pace * miles,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub target: TargetTime,
    /// `target_time` is replaced per course.
    pub planner: PlannerConfig,
    pub course: CourseConfig,
    pub split_unit: DistanceUnit,
    pub loop_course: bool,
}

impl BatchConfig {
    pub fn new(target: TargetTime, planner: PlannerConfig) -> Self {
        BatchConfig {
            target,
            planner,
            course: CourseConfig::default(),
            split_unit: DistanceUnit::Mile,
            loop_course: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub file: String,
    pub course: String,
    pub distance_mi: f64,
    pub target_time: f64,
    pub legs: usize,
    pub total_loss: f64,
    pub fastest_pace: String,
    pub slowest_pace: String,
    pub status: String,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

/// All `.gpx` files under `dir`, sorted by path.
pub fn find_gpx_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(std::io::Error::from)?;
        let is_gpx = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"));
        if entry.file_type().is_file() && is_gpx {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Output file stem for `path`: its location below `input_dir` without the
/// extension, with folders joined by `_`. `a/race.gpx` and `b/race.gpx`
/// become `a_race` and `b_race`.
pub fn output_stem(input_dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(input_dir).unwrap_or(path).with_extension("");
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    clean_filename(&parts.join("_"))
}

/// Loads, plans and exports one course found under `input_dir`.
pub fn plan_file(path: &Path, input_dir: &Path, output_dir: &Path, config: &BatchConfig) -> Result<BatchResult> {
    let course = load_gpx_course(path, &config.course)?;
    let target_time = config.target.for_distance(course.total_distance());
    let planner = PlannerConfig {
        target_time,
        ..config.planner.clone()
    };

    let mut engine = PacingEngine::new(course, planner)?;
    let plan = engine.solve()?;

    let mut stem = output_stem(input_dir, path);
    if stem.is_empty() {
        stem = clean_filename(&engine.course().name);
    }
    write_plan_outputs(
        output_dir,
        &stem,
        &plan,
        engine.course(),
        engine.config(),
        config.split_unit,
        config.loop_course,
    )?;

    let fastest = plan.leg_pace.iter().copied().fold(f64::INFINITY, f64::min);
    let slowest = plan.leg_pace.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(BatchResult {
        file: file_label(input_dir, path),
        course: engine.course().name.clone(),
        distance_mi: engine.course().total_distance(),
        target_time,
        legs: plan.legs(),
        total_loss: plan.total_loss,
        fastest_pace: pace_display_text(fastest),
        slowest_pace: pace_display_text(slowest),
        status: "OK".to_string(),
    })
}

fn file_label(input_dir: &Path, path: &Path) -> String {
    path.strip_prefix(input_dir).unwrap_or(path).display().to_string()
}

pub fn run_batch(input_dir: &Path, output_dir: &Path, config: &BatchConfig) -> Result<Vec<BatchResult>> {
    println!("\n🏃 RACE PACING BATCH");
    println!("====================");
    fs::create_dir_all(output_dir)?;
    println!("📁 Output folder: {}", output_dir.display());

    let files = find_gpx_files(input_dir)?;
    println!("🔍 Found {} GPX files to plan", files.len());
    println!("⚡ Using parallel processing on {} threads", rayon::current_num_threads());

    let results: Vec<BatchResult> = files
        .par_iter()
        .map(|path| match plan_file(path, input_dir, output_dir, config) {
            Ok(result) => {
                info!(file = %path.display(), legs = result.legs, "planned course");
                result
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping course");
                BatchResult {
                    file: file_label(input_dir, path),
                    course: "ERROR".to_string(),
                    distance_mi: 0.0,
                    target_time: 0.0,
                    legs: 0,
                    total_loss: 0.0,
                    fastest_pace: String::new(),
                    slowest_pace: String::new(),
                    status: format!("ERROR: {}", e),
                }
            }
        })
        .collect();

    let summary_path = output_dir.join(SUMMARY_FILE);
    write_summary_csv(&summary_path, &results)?;
    print_batch_summary(&results);
    println!("📊 Summary saved to: {}", summary_path.display());

    Ok(results)
}

pub fn write_summary_csv(path: &Path, results: &[BatchResult]) -> Result<()> {
    let mut wtr = Writer::from_path(path)?;
    for result in results {
        wtr.serialize(result)?;
    }
    wtr.flush()?;
    Ok(())
}

fn print_batch_summary(results: &[BatchResult]) {
    let ok: Vec<&BatchResult> = results.iter().filter(|r| r.is_ok()).collect();
    println!("\n🎯 BATCH SUMMARY");
    println!("================");
    println!("Total files: {}", results.len());
    println!("✅ Planned: {}", ok.len());
    println!("❌ Errors: {}", results.len() - ok.len());

    if !ok.is_empty() {
        let distance: f64 = ok.iter().map(|r| r.distance_mi).sum();
        let loss: f64 = ok.iter().map(|r| r.total_loss).sum::<f64>() / ok.len() as f64;
        println!("Total distance: {:.1} mi", distance);
        println!("Average plan loss: {:.3}", loss);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_track(path: &Path, points: usize) {
        let mut out = fs::File::create(path).unwrap();
        writeln!(
            out,
            r#"<?xml version="1.0" encoding="UTF-8"?><gpx version="1.1" creator="race-pacer-tests" xmlns="http://www.topografix.com/GPX/1/1"><trk><trkseg>"#
        )
        .unwrap();
        for i in 0..points {
            let ele = 50.0 + 20.0 * (i as f64 * 0.3).sin();
            writeln!(
                out,
                r#"<trkpt lat="{}" lon="-71.0"><ele>{}</ele></trkpt>"#,
                42.0 + i as f64 * 0.002,
                ele
            )
            .unwrap();
        }
        writeln!(out, "</trkseg></trk></gpx>").unwrap();
    }

    #[test]
    fn test_target_time_per_course() {
        assert_eq!(TargetTime::Minutes(30.0).for_distance(5.0), 30.0);
        assert_eq!(TargetTime::PacePerMile(8.0).for_distance(5.0), 40.0);
    }

    #[test]
    fn test_finds_nested_gpx_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        write_track(&dir.path().join("b.gpx"), 3);
        write_track(&dir.path().join("nested").join("a.GPX"), 3);
        fs::write(dir.path().join("notes.txt"), "ignore").unwrap();

        let files = find_gpx_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_batch_writes_outputs_and_error_rows() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_track(&input.path().join("good.gpx"), 60);
        fs::write(input.path().join("broken.gpx"), "not a gpx file").unwrap();

        let config = BatchConfig::new(TargetTime::PacePerMile(9.0), PlannerConfig::new(1.0, 3));
        let results = run_batch(input.path(), output.path(), &config).unwrap();
        assert_eq!(results.len(), 2);

        let good = results.iter().find(|r| r.file == "good.gpx").unwrap();
        assert!(good.is_ok());
        assert_eq!(good.legs, 3);
        assert!((good.target_time - 9.0 * good.distance_mi).abs() < 1e-9);

        let broken = results.iter().find(|r| r.file == "broken.gpx").unwrap();
        assert!(broken.status.starts_with("ERROR"));

        assert!(output.path().join(SUMMARY_FILE).exists());
        assert!(output.path().join("good_plan.json").exists());
        assert!(output.path().join("good_legs.geojson").exists());
    }

    #[test]
    fn test_output_stem_keeps_folders() {
        let root = Path::new("courses");
        assert_eq!(output_stem(root, &root.join("race.gpx")), "race");
        assert_eq!(output_stem(root, &root.join("2023").join("race.gpx")), "2023_race");
        assert_eq!(output_stem(root, &root.join("spring").join("hills").join("Race.GPX")), "spring_hills_Race");
    }

    #[test]
    fn test_same_file_name_in_two_folders() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for folder in ["boston", "chicago"] {
            fs::create_dir(input.path().join(folder)).unwrap();
        }
        write_track(&input.path().join("boston").join("race.gpx"), 60);
        write_track(&input.path().join("chicago").join("race.gpx"), 80);

        let config = BatchConfig::new(TargetTime::Minutes(20.0), PlannerConfig::new(20.0, 2));
        let results = run_batch(input.path(), output.path(), &config).unwrap();
        assert!(results.iter().all(|r| r.is_ok()));
        assert_ne!(results[0].file, results[1].file);

        let boston = fs::read_to_string(output.path().join("boston_race_legs.csv")).unwrap();
        let chicago = fs::read_to_string(output.path().join("chicago_race_legs.csv")).unwrap();
        assert_ne!(boston, chicago);
        assert!(!output.path().join("race_plan.json").exists());
    }
}
