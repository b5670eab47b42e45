/// Course profile: ordered, contiguous segments with a length (miles) and grade (percent).
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PacingError, Result};

/// Resampled track point at a segment boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub elevation_ft: f64,
}

#[derive(Debug, Deserialize)]
struct CourseRecord {
    length_mi: f64,
    grade_pct: f64,
}

#[derive(Debug, Clone)]
pub struct CourseProfile {
    pub name: String,
    lengths: Vec<f64>,
    grades: Vec<f64>,
    start_distances: Vec<f64>,
    end_distances: Vec<f64>,
    points: Option<Vec<TrackPoint>>,
}

impl CourseProfile {
    pub fn new(name: impl Into<String>, lengths: Vec<f64>, grades: Vec<f64>) -> Result<Self> {
        if lengths.is_empty() {
            return Err(PacingError::domain("course has no segments"));
        }
        if lengths.len() != grades.len() {
            return Err(PacingError::domain(format!(
                "{} segment lengths but {} grades",
                lengths.len(),
                grades.len()
            )));
        }
        if let Some((i, len)) = lengths
            .iter()
            .enumerate()
            .find(|(_, l)| !l.is_finite() || **l <= 0.0)
        {
            return Err(PacingError::domain(format!(
                "segment {} has non-positive length {}",
                i, len
            )));
        }
        if let Some(i) = grades.iter().position(|g| !g.is_finite()) {
            return Err(PacingError::domain(format!("segment {} has a non-finite grade", i)));
        }

        let mut start_distances = Vec::with_capacity(lengths.len());
        let mut end_distances = Vec::with_capacity(lengths.len());
        let mut running = 0.0;
        for &len in &lengths {
            start_distances.push(running);
            running += len;
            end_distances.push(running);
        }

        Ok(CourseProfile {
            name: name.into(),
            lengths,
            grades,
            start_distances,
            end_distances,
            points: None,
        })
    }

    /// Attaches the `n + 1` boundary points used by map exports.
    pub fn with_points(mut self, points: Vec<TrackPoint>) -> Result<Self> {
        if points.len() != self.lengths.len() + 1 {
            return Err(PacingError::domain(format!(
                "expected {} track points for {} segments, got {}",
                self.lengths.len() + 1,
                self.lengths.len(),
                points.len()
            )));
        }
        self.points = Some(points);
        Ok(self)
    }

    /// Reads a `length_mi,grade_pct` CSV file.
    pub fn from_csv_path(path: &Path, name: impl Into<String>) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut lengths = Vec::new();
        let mut grades = Vec::new();
        for record in rdr.deserialize::<CourseRecord>() {
            let record = record?;
            lengths.push(record.length_mi);
            grades.push(record.grade_pct);
        }
        Self::new(name, lengths, grades)
    }

    pub fn n_segments(&self) -> usize {
        self.lengths.len()
    }

    pub fn lengths(&self) -> &[f64] {
        &self.lengths
    }

    pub fn grades(&self) -> &[f64] {
        &self.grades
    }

    pub fn start_distances(&self) -> &[f64] {
        &self.start_distances
    }

    pub fn end_distances(&self) -> &[f64] {
        &self.end_distances
    }

    pub fn start_distance(&self, segment: usize) -> f64 {
        self.start_distances[segment]
    }

    pub fn end_distance(&self, segment: usize) -> f64 {
        self.end_distances[segment]
    }

    pub fn total_distance(&self) -> f64 {
        self.end_distances.last().copied().unwrap_or(0.0)
    }

    pub fn points(&self) -> Option<&[TrackPoint]> {
        self.points.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cumulative_distances() {
        let course = CourseProfile::new("test", vec![0.5, 1.0, 0.25], vec![0.0, 2.0, -1.0]).unwrap();
        assert_eq!(course.n_segments(), 3);
        assert_eq!(course.start_distances(), &[0.0, 0.5, 1.5]);
        assert_eq!(course.end_distances(), &[0.5, 1.5, 1.75]);
        assert_eq!(course.total_distance(), 1.75);
    }

    #[test]
    fn test_rejects_invalid_segments() {
        assert!(CourseProfile::new("empty", vec![], vec![]).is_err());
        assert!(CourseProfile::new("mismatch", vec![1.0, 1.0], vec![0.0]).is_err());
        assert!(CourseProfile::new("zero", vec![1.0, 0.0], vec![0.0, 0.0]).is_err());
        assert!(CourseProfile::new("nan", vec![1.0], vec![f64::NAN]).is_err());
    }

    #[test]
    fn test_point_count_must_match() {
        let course = CourseProfile::new("pts", vec![1.0, 1.0], vec![0.0, 0.0]).unwrap();
        let point = TrackPoint { lat: 0.0, lon: 0.0, elevation_ft: 0.0 };
        assert!(course.clone().with_points(vec![point; 2]).is_err());
        assert!(course.with_points(vec![point; 3]).is_ok());
    }

    #[test]
    fn test_reads_csv_course() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("course.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "length_mi,grade_pct").unwrap();
        writeln!(file, "1.0,0.0").unwrap();
        writeln!(file, "0.5,4.5").unwrap();
        drop(file);

        let course = CourseProfile::from_csv_path(&path, "csv").unwrap();
        assert_eq!(course.lengths(), &[1.0, 0.5]);
        assert_eq!(course.grades(), &[0.0, 4.5]);
    }
}
