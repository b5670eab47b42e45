/// Unit conversions and pace formatting.
///
/// Distances inside the planner are miles, elevations feet, paces minutes per mile.
use serde::{Deserialize, Serialize};

pub const METERS_TO_MILES: f64 = 0.000_621_371_2;
pub const METERS_TO_FEET: f64 = 3.280_84;
pub const MILES_TO_KM: f64 = 1.609_344;
pub const KM_TO_MILES: f64 = 1.0 / MILES_TO_KM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceUnit {
    Mile,
    Kilometer,
}

impl DistanceUnit {
    /// Length of one unit expressed in miles.
    pub fn in_miles(self) -> f64 {
        match self {
            DistanceUnit::Mile => 1.0,
            DistanceUnit::Kilometer => KM_TO_MILES,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DistanceUnit::Mile => "mi",
            DistanceUnit::Kilometer => "km",
        }
    }

    pub fn pace_label(self) -> &'static str {
        match self {
            DistanceUnit::Mile => "/mile",
            DistanceUnit::Kilometer => "/km",
        }
    }
}

/// Formats a pace in decimal minutes as `m:ss`.
pub fn pace_display_text(pace_minutes: f64) -> String {
    let total_seconds = (pace_minutes * 60.0).round().max(0.0) as u64;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Converts a pace in minutes per mile into minutes per `unit`.
pub fn convert_pace(pace_per_mile: f64, unit: DistanceUnit) -> f64 {
    pace_per_mile * unit.in_miles()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pace_display_text() {
        assert_eq!(pace_display_text(9.5), "9:30");
        assert_eq!(pace_display_text(10.0), "10:00");
        assert_eq!(pace_display_text(7.0 + 5.0 / 60.0), "7:05");
    }

    #[test]
    fn test_kilometer_pace_is_faster_number() {
        let per_km = convert_pace(8.0, DistanceUnit::Kilometer);
        assert!(per_km < 8.0);
        assert!((per_km * MILES_TO_KM - 8.0).abs() < 1e-12);
    }
}
