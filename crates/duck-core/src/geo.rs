//! Great-circle math for route synthesis and position interpolation.
//!
//! All distances are kilometres, all angles passed around between functions
//! are radians (0 = north, π/2 = east). Inputs and outputs for coordinates are
//! decimal degrees.

use std::f64::consts::PI;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Calculate distance between two points in kilometres using the Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Calculate the initial bearing from point 1 to point 2 in radians.
/// Returns bearing in radians, 0 = north, π/2 = east.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    x.atan2(y)
}

/// Initial bearing in compass degrees, normalized to [0, 360).
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    bearing(lat1, lon1, lat2, lon2).to_degrees().rem_euclid(360.0)
}

/// Project a destination point given a start, a distance and a bearing.
///
/// # Arguments
/// * `lat`, `lon` - Starting position in degrees
/// * `distance_km` - Distance in kilometres
/// * `bearing_rad` - Bearing in radians (0 = north, π/2 = east)
///
/// # Returns
/// (new_lat, new_lon) in degrees, longitude wrapped to [-180, 180)
pub fn destination_point(lat: f64, lon: f64, distance_km: f64, bearing_rad: f64) -> (f64, f64) {
    if distance_km.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let angular_distance = distance_km / EARTH_RADIUS_KM;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let lon2 = (lon1 + y.atan2(x) + PI).rem_euclid(2.0 * PI) - PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

/// Point a given fraction of the way along the great circle between two points.
///
/// `fraction` is clamped to [0, 1]. Endpoints are returned verbatim so callers
/// comparing against path endpoints do not see projection drift.
pub fn interpolate(lat1: f64, lon1: f64, lat2: f64, lon2: f64, fraction: f64) -> (f64, f64) {
    let fraction = fraction.clamp(0.0, 1.0);
    if fraction <= 0.0 {
        return (lat1, lon1);
    }
    if fraction >= 1.0 {
        return (lat2, lon2);
    }
    let distance_km = haversine_km(lat1, lon1, lat2, lon2);
    let heading = bearing(lat1, lon1, lat2, lon2);
    destination_point(lat1, lon1, distance_km * fraction, heading)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_one_degree_of_latitude() {
        let dist = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111.19).abs() < 0.1, "got {dist}");
    }

    #[test]
    fn haversine_same_point_is_zero() {
        let dist = haversine_km(40.7128, -74.0060, 40.7128, -74.0060);
        assert!(dist < 1e-9);
    }

    #[test]
    fn haversine_new_york_to_london() {
        let dist = haversine_km(40.7128, -74.0060, 51.5074, -0.1278);
        assert!((dist - 5570.0).abs() < 50.0, "got {dist}");
    }

    #[test]
    fn bearing_due_east_on_equator() {
        let b = bearing_deg(0.0, 0.0, 0.0, 10.0);
        assert!((b - 90.0).abs() < 1e-6);
    }

    #[test]
    fn destination_point_round_trips_distance() {
        let heading = bearing(40.7128, -74.0060, 51.5074, -0.1278);
        let (lat, lon) = destination_point(40.7128, -74.0060, 1000.0, heading);
        let dist = haversine_km(40.7128, -74.0060, lat, lon);
        assert!((dist - 1000.0).abs() < 1e-6, "got {dist}");
    }

    #[test]
    fn destination_point_wraps_antimeridian() {
        let (_, lon) = destination_point(0.0, 179.5, 200.0, PI / 2.0);
        assert!(lon < -178.0, "got {lon}");
    }

    #[test]
    fn interpolate_midpoint_is_equidistant() {
        let (lat, lon) = interpolate(10.0, 10.0, 20.0, 30.0, 0.5);
        let a = haversine_km(10.0, 10.0, lat, lon);
        let b = haversine_km(lat, lon, 20.0, 30.0);
        assert!((a - b).abs() < 1e-6);
    }
}
