//! Reward points for completed journeys.

use crate::models::{JourneyResult, WeatherSample};

/// Multiplier applied when the duck flew through rain or storms.
pub const BAD_WEATHER_MULTIPLIER: f64 = 1.25;
/// Journeys longer than this earn [`LONG_HAUL_BONUS`].
pub const LONG_HAUL_KM: f64 = 10_000.0;
pub const LONG_HAUL_BONUS: u64 = 5_000;

/// `floor(floor(distance) × 1.25 if wet) + 5000 if distance > 10000`.
pub fn compute_points(total_distance_km: f64, weather_history: &[WeatherSample]) -> u64 {
    let distance = if total_distance_km.is_finite() {
        total_distance_km.max(0.0)
    } else {
        0.0
    };
    let mut points = distance.floor();
    if weather_history.iter().any(|sample| sample.kind.is_wet()) {
        points = (points * BAD_WEATHER_MULTIPLIER).floor();
    }
    let mut points = points as u64;
    if distance > LONG_HAUL_KM {
        points += LONG_HAUL_BONUS;
    }
    points
}

pub fn journey_result(total_distance_km: f64, weather_history: &[WeatherSample]) -> JourneyResult {
    JourneyResult {
        total_distance_km,
        weather_events: weather_history.to_vec(),
        points_earned: compute_points(total_distance_km, weather_history),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, WeatherKind};
    use chrono::Utc;

    fn sample(kind: WeatherKind) -> WeatherSample {
        WeatherSample::new(kind, 0.9, Location::new(0.0, 0.0).unwrap(), Utc::now())
    }

    #[test]
    fn clear_journey_is_one_point_per_km() {
        assert_eq!(compute_points(5585.0, &[]), 5585);
        assert_eq!(compute_points(5585.9, &[sample(WeatherKind::Clear)]), 5585);
    }

    #[test]
    fn storm_applies_multiplier() {
        assert_eq!(compute_points(5585.0, &[sample(WeatherKind::Storm)]), 6981);
        assert_eq!(compute_points(5585.0, &[sample(WeatherKind::Rain)]), 6981);
        assert_eq!(compute_points(5585.0, &[sample(WeatherKind::Wind)]), 5585);
    }

    #[test]
    fn long_haul_bonus_after_multiplier() {
        assert_eq!(compute_points(12000.0, &[sample(WeatherKind::Storm)]), 20000);
        assert_eq!(compute_points(10000.0, &[]), 10000);
        assert_eq!(compute_points(10000.5, &[]), 15000);
    }

    #[test]
    fn journey_result_copies_history() {
        let history = vec![sample(WeatherKind::Rain)];
        let result = journey_result(100.0, &history);
        assert_eq!(result.points_earned, 125);
        assert_eq!(result.weather_events, history);
    }
}
