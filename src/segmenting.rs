//! Fixed leg layouts that do not optimize anything: one leg for the whole
//! course, one leg per mile or kilometer, or one leg per detected hill.
use tracing::debug;

use crate::course::CourseProfile;
use crate::units::{DistanceUnit, METERS_TO_MILES};

/// Shortest climb or descent kept as its own leg, in miles (350 m).
pub const MIN_HILL_LENGTH_MI: f64 = 350.0 * METERS_TO_MILES;
/// Smallest elevation range a hill must cover, in feet.
pub const MIN_HILL_RELIEF_FT: f64 = 30.0;
/// Grade (%) at or above which a segment counts as climbing.
pub const MIN_UPHILL_GRADE: f64 = 2.0;
/// Grade (%) at or below whose negative a segment counts as descending.
pub const MIN_DOWNHILL_GRADE: f64 = 3.0;
/// Flat stretches shorter than this (miles) are folded into a neighbour.
pub const MIN_FILLER_LENGTH_MI: f64 = 0.25;

const FEET_PER_MILE: f64 = 5280.0;

pub fn single_leg_boundaries() -> Vec<usize> {
    vec![0]
}

/// Starts a new leg at the segment whose start lies closest to each whole unit marker.
pub fn unit_marker_boundaries(course: &CourseProfile, unit: DistanceUnit) -> Vec<usize> {
    let unit_miles = unit.in_miles();
    let starts = course.start_distances();
    let markers = (course.total_distance() / unit_miles).ceil() as usize;

    let mut boundaries = vec![0];
    for marker in 1..markers {
        let target = marker as f64 * unit_miles;
        let after = starts.partition_point(|&d| d < target);
        let closest = match after {
            0 => 0,
            i if i >= starts.len() => starts.len() - 1,
            i if (starts[i] - target).abs() < (target - starts[i - 1]).abs() => i,
            i => i - 1,
        };
        if boundaries.last().is_some_and(|&last| closest > last) {
            boundaries.push(closest);
        }
    }
    boundaries
}

/// Starts a leg at every significant climb and descent, and at each flat
/// stretch between them long enough to stand on its own.
pub fn hill_boundaries(course: &CourseProfile) -> Vec<usize> {
    let n = course.n_segments();
    if n == 0 {
        return single_leg_boundaries();
    }
    let elevations = profile_elevations(course);
    let grades = course.grades();

    let negated: Vec<f64> = grades.iter().map(|g| -g).collect();
    let mut hills = continuous_runs(grades, MIN_UPHILL_GRADE);
    hills.extend(continuous_runs(&negated, MIN_DOWNHILL_GRADE));
    hills.retain(|&(start, end)| {
        run_length(course, start, end) >= MIN_HILL_LENGTH_MI && relief(&elevations, start, end) >= MIN_HILL_RELIEF_FT
    });
    hills.sort_unstable();

    let pieces = spanning_pieces(&hills, n);
    let merged = merge_short_fillers(course, &elevations, &pieces);
    debug!(hills = hills.len(), legs = merged.len(), "detected hill legs");
    merged.into_iter().map(|(start, _)| start).collect()
}

/// Elevation in feet at each segment boundary, relative to the start line.
fn profile_elevations(course: &CourseProfile) -> Vec<f64> {
    let mut elevations = Vec::with_capacity(course.n_segments() + 1);
    let mut current = 0.0;
    elevations.push(current);
    for (&length, &grade) in course.lengths().iter().zip(course.grades()) {
        current += grade / 100.0 * length * FEET_PER_MILE;
        elevations.push(current);
    }
    elevations
}

/// Inclusive runs of segments with `signed[i] >= threshold`. Each run grows
/// outward over neighbours that still point the same way (`signed >= 0`).
fn continuous_runs(signed: &[f64], threshold: f64) -> Vec<(usize, usize)> {
    let n = signed.len();
    let mut runs = Vec::new();
    let mut start = None;
    let mut i = 0;
    while i < n {
        if signed[i] >= threshold {
            if start.is_none() {
                let mut s = i;
                while s > 0 && signed[s - 1] >= 0.0 {
                    s -= 1;
                }
                start = Some(s);
            }
            i += 1;
        } else if let Some(s) = start.take() {
            let mut end = i - 1;
            while end + 1 < n && signed[end + 1] >= 0.0 {
                end += 1;
            }
            runs.push((s, end));
            i = end + 1;
        } else {
            i += 1;
        }
    }
    if let Some(s) = start {
        runs.push((s, n - 1));
    }
    runs
}

fn run_length(course: &CourseProfile, start: usize, end: usize) -> f64 {
    course.end_distance(end) - course.start_distance(start)
}

fn relief(elevations: &[f64], start: usize, end: usize) -> f64 {
    let span = &elevations[start..=end + 1];
    let high = span.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let low = span.iter().copied().fold(f64::INFINITY, f64::min);
    high - low
}

fn overall_grade(course: &CourseProfile, elevations: &[f64], start: usize, end: usize) -> f64 {
    let distance_ft = run_length(course, start, end) * FEET_PER_MILE;
    if distance_ft <= 0.0 {
        return 0.0;
    }
    (elevations[end + 1] - elevations[start]) / distance_ft * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Piece {
    start: usize,
    end: usize,
    filler: bool,
}

/// Hills in course order with filler pieces covering every gap.
fn spanning_pieces(hills: &[(usize, usize)], n: usize) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut cursor = 0;
    for &(start, end) in hills {
        if end < cursor {
            continue;
        }
        if start > cursor {
            pieces.push(Piece { start: cursor, end: start - 1, filler: true });
        }
        pieces.push(Piece { start: start.max(cursor), end, filler: false });
        cursor = end + 1;
    }
    if cursor < n {
        pieces.push(Piece { start: cursor, end: n - 1, filler: true });
    }
    pieces
}

/// Folds each short filler into the neighbour whose overall grade is closest
/// to its own; the previous piece wins ties.
fn merge_short_fillers(course: &CourseProfile, elevations: &[f64], pieces: &[Piece]) -> Vec<(usize, usize)> {
    let grade = |start: usize, end: usize| overall_grade(course, elevations, start, end);
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(pieces.len());
    let mut idx = 0;
    while idx < pieces.len() {
        let piece = pieces[idx];
        if !piece.filler || run_length(course, piece.start, piece.end) >= MIN_FILLER_LENGTH_MI {
            merged.push((piece.start, piece.end));
            idx += 1;
            continue;
        }

        let own = grade(piece.start, piece.end);
        let prev_gap = merged.last().map(|&(s, e)| (grade(s, e) - own).abs());
        let next = pieces.get(idx + 1).copied();
        let next_gap = next.map(|q| (grade(q.start, q.end) - own).abs());
        let merge_prev = match (prev_gap, next_gap) {
            (Some(prev_gap), Some(next_gap)) => prev_gap <= next_gap,
            (Some(_), None) => true,
            _ => false,
        };
        if merge_prev {
            if let Some(last) = merged.last_mut() {
                last.1 = piece.end;
            }
            idx += 1;
        } else if let Some(next) = next {
            merged.push((piece.start, next.end));
            idx += 2;
        } else {
            merged.push((piece.start, piece.end));
            idx += 1;
        }
    }
    merged
}
