//! Core data models for duck courier flights.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LocationError;

/// A validated point on the globe.
///
/// Construction rejects latitudes outside [-90, 90], longitudes outside
/// [-180, 180] and non-finite values, so every `Location` in the system is
/// usable by the geo math without further checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLocation")]
pub struct Location {
    latitude: f64,
    longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default)]
    anonymous: bool,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    anonymous: bool,
}

impl TryFrom<RawLocation> for Location {
    type Error = LocationError;

    fn try_from(raw: RawLocation) -> Result<Self, Self::Error> {
        let mut location = Location::new(raw.latitude, raw.longitude)?;
        location.label = raw.label;
        location.anonymous = raw.anonymous;
        Ok(location)
    }
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(LocationError {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
            label: None,
            anonymous: false,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Mark the location as anonymous (the sender/recipient chose not to
    /// reveal the exact place name).
    pub fn anonymized(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// Great-circle distance to another location in kilometres.
    pub fn distance_km(&self, other: &Location) -> f64 {
        crate::geo::haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Same coordinates, ignoring label and anonymity.
    pub fn same_point(&self, other: &Location) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

/// A point of a planned path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    /// Projected time the duck passes this point at the planning speed.
    pub sequence_time: DateTime<Utc>,
}

impl Waypoint {
    pub fn distance_km(&self, other: &Waypoint) -> f64 {
        crate::geo::haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Total great-circle length of a path in kilometres.
pub fn path_length_km(path: &[Waypoint]) -> f64 {
    path.windows(2).map(|pair| pair[0].distance_km(&pair[1])).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherKind {
    Clear,
    Rain,
    Storm,
    Wind,
}

impl WeatherKind {
    /// Speed multiplier for this kind at the given intensity (clamped to [0, 1]).
    pub fn speed_multiplier(self, intensity: f64) -> f64 {
        let intensity = intensity.clamp(0.0, 1.0);
        match self {
            WeatherKind::Clear => 1.0,
            WeatherKind::Rain => 1.0 - 0.3 * intensity,
            WeatherKind::Wind => 1.0 - 0.25 * intensity,
            WeatherKind::Storm => 1.0 - 0.6 * intensity,
        }
    }

    /// Rain and storms earn the bad-weather scoring bonus.
    pub fn is_wet(self) -> bool {
        matches!(self, WeatherKind::Rain | WeatherKind::Storm)
    }
}

impl std::str::FromStr for WeatherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clear" => Ok(WeatherKind::Clear),
            "rain" => Ok(WeatherKind::Rain),
            "storm" => Ok(WeatherKind::Storm),
            "wind" => Ok(WeatherKind::Wind),
            other => Err(format!("unknown weather kind: {other}")),
        }
    }
}

/// One weather observation at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    pub kind: WeatherKind,
    pub intensity: f64,
    pub speed_multiplier: f64,
    pub location: Location,
    pub observed_at: DateTime<Utc>,
}

impl WeatherSample {
    /// Build a sample whose multiplier follows [`WeatherKind::speed_multiplier`].
    pub fn new(
        kind: WeatherKind,
        intensity: f64,
        location: Location,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let intensity = if intensity.is_finite() {
            intensity.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            kind,
            intensity,
            speed_multiplier: kind.speed_multiplier(intensity),
            location,
            observed_at,
        }
    }

    pub fn with_speed_multiplier(mut self, multiplier: f64) -> Self {
        self.speed_multiplier = multiplier;
        self
    }

    /// Storm stronger than `threshold` intensity.
    pub fn is_severe(&self, threshold: f64) -> bool {
        self.kind == WeatherKind::Storm && self.intensity > threshold
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    #[default]
    EnRoute,
    Delivered,
    Cancelled,
}

/// A duck in the air.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    pub id: String,
    pub status: FlightStatus,
    pub origin: Location,
    pub destination: Location,
    pub path: Vec<Waypoint>,
    /// Distance already flown plus the length of the current path.
    pub total_distance_km: f64,
    /// Distance flown so far, measured along the paths flown.
    pub distance_covered_km: f64,
    /// Distance along `path` at which `path[0]` sits (non-zero after a replan).
    pub path_offset_km: f64,
    pub current_position: Location,
    pub progress_pct: f64,
    pub speed_kmh: f64,
    pub weather_history: Vec<WeatherSample>,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub estimated_arrival: DateTime<Utc>,
    #[serde(default)]
    pub reroute_count: u32,
}

impl Flight {
    pub fn distance_remaining_km(&self) -> f64 {
        (self.total_distance_km - self.distance_covered_km).max(0.0)
    }

    /// Most recent weather sample, if any was observed.
    pub fn last_weather(&self) -> Option<&WeatherSample> {
        self.weather_history.last()
    }

    pub fn progress(&self) -> FlightProgress {
        FlightProgress {
            flight_id: self.id.clone(),
            status: self.status,
            progress_pct: self.progress_pct,
            current_position: self.current_position.clone(),
            speed_kmh: self.speed_kmh,
            distance_covered_km: self.distance_covered_km,
            distance_remaining_km: self.distance_remaining_km(),
            estimated_arrival: self.estimated_arrival,
            last_updated_at: self.last_updated_at,
        }
    }
}

/// Compact read model of a flight for progress displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightProgress {
    pub flight_id: String,
    pub status: FlightStatus,
    pub progress_pct: f64,
    pub current_position: Location,
    pub speed_kmh: f64,
    pub distance_covered_km: f64,
    pub distance_remaining_km: f64,
    pub estimated_arrival: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Outcome of a completed journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyResult {
    pub total_distance_km: f64,
    pub weather_events: Vec<WeatherSample>,
    pub points_earned: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_rejects_out_of_range() {
        assert!(Location::new(90.5, 0.0).is_err());
        assert!(Location::new(0.0, -180.1).is_err());
        assert!(Location::new(f64::NAN, 0.0).is_err());
        assert!(Location::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn location_deserialize_validates() {
        let ok: Result<Location, _> =
            serde_json::from_str(r#"{"latitude": 40.7, "longitude": -74.0, "label": "NYC"}"#);
        let ok = ok.expect("valid location");
        assert_eq!(ok.label(), Some("NYC"));
        assert!(!ok.is_anonymous());

        let bad: Result<Location, _> =
            serde_json::from_str(r#"{"latitude": 140.7, "longitude": -74.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn weather_multipliers_by_kind() {
        assert_eq!(WeatherKind::Clear.speed_multiplier(1.0), 1.0);
        assert!((WeatherKind::Rain.speed_multiplier(1.0) - 0.7).abs() < 1e-9);
        assert!((WeatherKind::Storm.speed_multiplier(0.5) - 0.7).abs() < 1e-9);
        assert!((WeatherKind::Wind.speed_multiplier(2.0) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn severe_only_for_strong_storms() {
        let here = Location::new(0.0, 0.0).unwrap();
        let now = Utc::now();
        assert!(WeatherSample::new(WeatherKind::Storm, 0.8, here.clone(), now).is_severe(0.7));
        assert!(!WeatherSample::new(WeatherKind::Storm, 0.7, here.clone(), now).is_severe(0.7));
        assert!(!WeatherSample::new(WeatherKind::Rain, 1.0, here, now).is_severe(0.7));
    }
}
