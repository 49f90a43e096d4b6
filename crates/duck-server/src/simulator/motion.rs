//! Position integration along a flight's path.

use chrono::{DateTime, Utc};
use duck_core::{bearing, destination_point, travel_duration, Flight, Location, Waypoint};

/// Distance to the destination under which the duck counts as arrived.
pub const ARRIVAL_TOLERANCE_KM: f64 = 0.1;
pub const ARRIVAL_PCT: f64 = 99.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No time elapsed since the last update.
    Unchanged,
    Advanced,
    /// The flight reached its destination during this step.
    Arrived,
}

/// Advance `flight` to `now` at its current speed.
///
/// Progress never decreases, and arrival pins the flight to its destination
/// with exactly 100 percent.
pub fn advance(flight: &mut Flight, now: DateTime<Utc>) -> TickOutcome {
    let elapsed_ms = (now - flight.last_updated_at).num_milliseconds();
    if elapsed_ms <= 0 {
        return TickOutcome::Unchanged;
    }

    let hours = elapsed_ms as f64 / 3_600_000.0;
    let step_km = if flight.speed_kmh.is_finite() {
        flight.speed_kmh.max(0.0) * hours
    } else {
        0.0
    };
    let total = flight.total_distance_km.max(0.0);
    let covered = (flight.distance_covered_km + step_km).min(total);

    flight.distance_covered_km = covered;
    flight.last_updated_at = now;

    let pct = if total <= 0.0 {
        100.0
    } else {
        covered / total * 100.0
    };
    flight.progress_pct = pct.max(flight.progress_pct).clamp(0.0, 100.0);

    if covered >= total - ARRIVAL_TOLERANCE_KM || flight.progress_pct >= ARRIVAL_PCT {
        land(flight);
        return TickOutcome::Arrived;
    }

    let along_path = covered - flight.path_offset_km;
    if let Some(position) = position_along(&flight.path, along_path) {
        flight.current_position = position;
    }
    flight.estimated_arrival = now + travel_duration(flight.distance_remaining_km(), flight.speed_kmh);
    TickOutcome::Advanced
}

/// Pin the flight to its destination at 100 percent.
pub fn land(flight: &mut Flight) {
    flight.progress_pct = 100.0;
    flight.distance_covered_km = flight.total_distance_km.max(0.0);
    flight.current_position = flight.destination.clone();
    flight.estimated_arrival = flight.last_updated_at;
}

/// Point `distance_km` along `path`, measured from its first waypoint.
pub fn position_along(path: &[Waypoint], distance_km: f64) -> Option<Location> {
    let first = path.first()?;
    let mut remaining = distance_km.max(0.0);

    for pair in path.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        let segment_km = from.distance_km(to);
        if remaining <= segment_km {
            if segment_km <= 0.0 {
                return Location::new(from.latitude, from.longitude).ok();
            }
            let heading = bearing(from.latitude, from.longitude, to.latitude, to.longitude);
            let (lat, lon) = destination_point(from.latitude, from.longitude, remaining, heading);
            return Location::new(lat, lon).ok();
        }
        remaining -= segment_km;
    }

    let last = path.last().unwrap_or(first);
    Location::new(last.latitude, last.longitude).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use duck_core::{path_length_km, FlightStatus};

    fn waypoint(lat: f64, lon: f64, at: DateTime<Utc>) -> Waypoint {
        Waypoint {
            latitude: lat,
            longitude: lon,
            altitude_m: 100.0,
            sequence_time: at,
        }
    }

    fn flight(speed_kmh: f64) -> Flight {
        let start = Utc::now();
        let path = vec![
            waypoint(0.0, 0.0, start),
            waypoint(0.0, 1.0, start),
            waypoint(0.0, 2.0, start),
        ];
        let total = path_length_km(&path);
        let origin = Location::new(0.0, 0.0).unwrap();
        Flight {
            id: "duck-test".into(),
            status: FlightStatus::EnRoute,
            origin: origin.clone(),
            destination: Location::new(0.0, 2.0).unwrap(),
            path,
            total_distance_km: total,
            distance_covered_km: 0.0,
            path_offset_km: 0.0,
            current_position: origin,
            progress_pct: 0.0,
            speed_kmh,
            weather_history: Vec::new(),
            started_at: start,
            last_updated_at: start,
            estimated_arrival: start + travel_duration(total, speed_kmh),
            reroute_count: 0,
        }
    }

    #[test]
    fn zero_elapsed_changes_nothing() {
        let mut f = flight(50.0);
        let before = f.clone();
        let now = f.last_updated_at;
        assert_eq!(advance(&mut f, now), TickOutcome::Unchanged);
        assert_eq!(f.progress_pct, before.progress_pct);
        assert_eq!(f.current_position, before.current_position);
    }

    #[test]
    fn progress_increases_with_time() {
        let mut f = flight(50.0);
        let t0 = f.last_updated_at;
        assert_eq!(advance(&mut f, t0 + Duration::hours(1)), TickOutcome::Advanced);
        let first = f.progress_pct;
        assert!(first > 0.0);
        assert!((f.distance_covered_km - 50.0).abs() < 1e-6);

        assert_eq!(advance(&mut f, t0 + Duration::hours(2)), TickOutcome::Advanced);
        assert!(f.progress_pct > first);
        // 100 km along the equator is just under 0.9 degrees east.
        assert!(f.current_position.latitude().abs() < 1e-6);
        assert!((f.current_position.longitude() - 0.8993).abs() < 1e-3);
    }

    #[test]
    fn position_crosses_segment_boundaries() {
        let mut f = flight(150.0);
        let t0 = f.last_updated_at;
        advance(&mut f, t0 + Duration::hours(1));
        assert!(f.current_position.longitude() > 1.0);
        assert!(f.current_position.longitude() < 2.0);
    }

    #[test]
    fn overshoot_lands_exactly() {
        let mut f = flight(10_000.0);
        let t0 = f.last_updated_at;
        assert_eq!(advance(&mut f, t0 + Duration::hours(5)), TickOutcome::Arrived);
        assert_eq!(f.progress_pct, 100.0);
        assert_eq!(f.distance_covered_km, f.total_distance_km);
        assert!(f.current_position.same_point(&f.destination));
    }

    #[test]
    fn degenerate_flight_arrives_on_first_step() {
        let mut f = flight(50.0);
        f.total_distance_km = 0.0;
        let t0 = f.last_updated_at;
        assert_eq!(advance(&mut f, t0 + Duration::seconds(1)), TickOutcome::Arrived);
        assert_eq!(f.progress_pct, 100.0);
    }

    #[test]
    fn progress_never_goes_backwards() {
        let mut f = flight(50.0);
        f.progress_pct = 40.0;
        let t0 = f.last_updated_at;
        advance(&mut f, t0 + Duration::minutes(1));
        assert_eq!(f.progress_pct, 40.0);
    }

    #[test]
    fn position_uses_path_offset() {
        let mut f = flight(50.0);
        f.path_offset_km = 500.0;
        f.distance_covered_km = 500.0;
        f.total_distance_km += 500.0;
        let t0 = f.last_updated_at;
        advance(&mut f, t0 + Duration::hours(1));
        assert!((f.current_position.longitude() - 0.4497).abs() < 1e-3);
    }

    #[test]
    fn position_along_empty_path_is_none() {
        assert!(position_along(&[], 10.0).is_none());
    }
}
