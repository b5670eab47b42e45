/// GPX ingestion: reads a track, resamples it into equal-length segments,
/// smooths the elevation profile and derives per-segment grades.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Q_BUTTERWORTH_F64};
use geo::{point, HaversineDistance};
use gpx::read;
use tracing::{debug, warn};

use crate::config::{CourseConfig, SmoothingMethod};
use crate::course::{CourseProfile, TrackPoint};
use crate::error::{PacingError, Result};
use crate::units::{METERS_TO_FEET, METERS_TO_MILES};

/// `(lat, lon, elevation_m)`
pub type Coord = (f64, f64, f64);

pub fn load_gpx_course(path: &Path, config: &CourseConfig) -> Result<CourseProfile> {
    let file = File::open(path)?;
    let gpx = read(BufReader::new(file)).map_err(|e| PacingError::Gpx(e.to_string()))?;

    let mut coords = Vec::new();
    for track in &gpx.tracks {
        for segment in &track.segments {
            for waypoint in &segment.points {
                if let Some(elevation) = waypoint.elevation {
                    coords.push((waypoint.point().y(), waypoint.point().x(), elevation));
                }
            }
        }
    }

    let name = gpx
        .tracks
        .iter()
        .find_map(|track| track.name.clone())
        .map(|name| clean_filename(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            clean_filename(&stem)
        });

    debug!(file = %path.display(), points = coords.len(), "read GPX track");
    course_from_coords(name, &coords, config)
}

/// Builds a course from raw `(lat, lon, elevation_m)` track points.
pub fn course_from_coords(name: impl Into<String>, coords: &[Coord], config: &CourseConfig) -> Result<CourseProfile> {
    if config.segments == 0 {
        return Err(PacingError::domain("course must be resampled into at least one segment"));
    }
    let coords = drop_repeated_points(coords);
    if coords.len() < 2 {
        return Err(PacingError::domain("track needs at least two distinct points with elevation"));
    }

    let distances = cumulative_distances(&coords);
    let total_m = distances.last().copied().unwrap_or(0.0);
    let spacing_m = total_m / config.segments as f64;

    let resampled = resample_uniform(&coords, &distances, config.segments);
    let raw_elevations: Vec<f64> = resampled.iter().map(|c| c.2).collect();
    let elevations = smooth_elevations(&raw_elevations, spacing_m, config.smoothing);

    let grades: Vec<f64> = elevations
        .windows(2)
        .map(|w| (w[1] - w[0]) / spacing_m * 100.0)
        .collect();
    let lengths = vec![spacing_m * METERS_TO_MILES; config.segments];
    let points = resampled
        .iter()
        .zip(&elevations)
        .map(|(&(lat, lon, _), &ele)| TrackPoint {
            lat,
            lon,
            elevation_ft: ele * METERS_TO_FEET,
        })
        .collect();

    CourseProfile::new(name, lengths, grades)?.with_points(points)
}

/// Removes points that add no distance to the track.
fn drop_repeated_points(coords: &[Coord]) -> Vec<Coord> {
    let mut kept: Vec<Coord> = Vec::with_capacity(coords.len());
    for &c in coords {
        match kept.last() {
            Some(&last) if haversine_m(last, c) <= 0.0 => {}
            _ => kept.push(c),
        }
    }
    kept
}

fn haversine_m(a: Coord, b: Coord) -> f64 {
    let a = point!(x: a.1, y: a.0);
    let b = point!(x: b.1, y: b.0);
    a.haversine_distance(&b)
}

/// Cumulative distance in meters along the track, starting at 0.
pub fn cumulative_distances(coords: &[Coord]) -> Vec<f64> {
    let mut distances = Vec::with_capacity(coords.len());
    let mut running = 0.0;
    for (i, &c) in coords.iter().enumerate() {
        if i > 0 {
            running += haversine_m(coords[i - 1], c);
        }
        distances.push(running);
    }
    distances
}

/// Linearly interpolates `segments + 1` points at equal distance steps.
///
/// `distances` must be strictly increasing.
pub fn resample_uniform(coords: &[Coord], distances: &[f64], segments: usize) -> Vec<Coord> {
    let Some(&total) = distances.last() else {
        return Vec::new();
    };
    let last = coords.len() - 1;

    (0..=segments)
        .map(|i| {
            if i == segments {
                return coords[last];
            }
            let target = i as f64 * total / segments as f64;
            let idx = distances
                .partition_point(|&d| d <= target)
                .saturating_sub(1)
                .min(last.saturating_sub(1));
            let (d0, d1) = (distances[idx], distances[idx + 1]);
            let t = ((target - d0) / (d1 - d0)).clamp(0.0, 1.0);
            let (a, b) = (coords[idx], coords[idx + 1]);
            (
                a.0 + t * (b.0 - a.0),
                a.1 + t * (b.1 - a.1),
                a.2 + t * (b.2 - a.2),
            )
        })
        .collect()
}

pub fn smooth_elevations(elevations: &[f64], spacing_m: f64, method: SmoothingMethod) -> Vec<f64> {
    match method {
        SmoothingMethod::None => elevations.to_vec(),
        SmoothingMethod::Box { window_m } => {
            let half = ((window_m / spacing_m) / 2.0).floor().max(0.0) as usize;
            box_smooth(elevations, half)
        }
        SmoothingMethod::Gaussian { sigma } => gaussian_smooth(elevations, sigma),
        SmoothingMethod::Butterworth { cutoff_wavelength_m } => {
            butterworth_smooth(elevations, spacing_m, cutoff_wavelength_m)
        }
    }
}

fn padded(values: &[f64], i: isize) -> f64 {
    let last = values.len() as isize - 1;
    values[i.clamp(0, last) as usize]
}

/// Moving average over `2 * half + 1` samples with edge padding.
pub fn box_smooth(values: &[f64], half: usize) -> Vec<f64> {
    if half == 0 || values.is_empty() {
        return values.to_vec();
    }
    let half = half as isize;
    let width = (2 * half + 1) as f64;
    (0..values.len() as isize)
        .map(|i| (-half..=half).map(|o| padded(values, i + o)).sum::<f64>() / width)
        .collect()
}

/// Gaussian kernel smoothing, `sigma` in samples, radius `ceil(4 sigma)`.
pub fn gaussian_smooth(values: &[f64], sigma: f64) -> Vec<f64> {
    if !(sigma > 0.0) || values.is_empty() {
        return values.to_vec();
    }
    let radius = (4.0 * sigma).ceil() as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|x| (-((x * x) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let norm: f64 = kernel.iter().sum();

    (0..values.len() as isize)
        .map(|i| {
            kernel
                .iter()
                .zip(-radius..=radius)
                .map(|(w, o)| w * padded(values, i + o))
                .sum::<f64>()
                / norm
        })
        .collect()
}

/// Zero-phase Butterworth low-pass removing features shorter than `cutoff_wavelength_m`.
pub fn butterworth_smooth(values: &[f64], spacing_m: f64, cutoff_wavelength_m: f64) -> Vec<f64> {
    if values.len() < 3 || !(spacing_m > 0.0) || !(cutoff_wavelength_m > 0.0) {
        return values.to_vec();
    }
    let sample_rate = 1.0 / spacing_m;
    let nyquist = sample_rate / 2.0;
    let cutoff = (1.0 / cutoff_wavelength_m).clamp(0.01 * nyquist, 0.45 * nyquist);

    let coeffs = match Coefficients::<f64>::from_params(
        biquad::Type::LowPass,
        sample_rate.hz(),
        cutoff.hz(),
        Q_BUTTERWORTH_F64,
    ) {
        Ok(c) => c,
        Err(e) => {
            warn!(?e, "Butterworth design failed, elevations left unfiltered");
            return values.to_vec();
        }
    };

    // filter around the first sample so the zero initial state does not drag the start down
    let offset = values[0];
    let mut forward = DirectForm1::<f64>::new(coeffs);
    let mut filtered: Vec<f64> = values.iter().map(|&x| forward.run(x - offset)).collect();

    filtered.reverse();
    let tail = filtered[0];
    let mut backward = DirectForm1::<f64>::new(coeffs);
    let mut smoothed: Vec<f64> = filtered.iter().map(|&x| backward.run(x - tail) + tail).collect();
    smoothed.reverse();

    smoothed.iter().map(|x| x + offset).collect()
}

/// Replaces characters that are not allowed in file names and drops a `.gpx` suffix.
pub fn clean_filename(name: &str) -> String {
    let name = if name.to_lowercase().ends_with(".gpx") {
        &name[..name.len() - 4]
    } else {
        name
    };

    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
