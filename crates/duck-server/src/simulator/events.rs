//! Flight lifecycle events broadcast to subscribers.

use duck_core::{FlightProgress, JourneyResult, WeatherSample};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlightEvent {
    Started {
        progress: FlightProgress,
        total_distance_km: f64,
    },
    Progress {
        progress: FlightProgress,
    },
    WeatherChanged {
        flight_id: String,
        sample: WeatherSample,
        speed_kmh: f64,
    },
    Rerouted {
        flight_id: String,
        reroute_count: u32,
        total_distance_km: f64,
    },
    Delivered {
        flight_id: String,
        result: JourneyResult,
    },
    Cancelled {
        flight_id: String,
    },
}

impl FlightEvent {
    pub fn flight_id(&self) -> &str {
        match self {
            FlightEvent::Started { progress, .. } | FlightEvent::Progress { progress } => {
                &progress.flight_id
            }
            FlightEvent::WeatherChanged { flight_id, .. }
            | FlightEvent::Rerouted { flight_id, .. }
            | FlightEvent::Delivered { flight_id, .. }
            | FlightEvent::Cancelled { flight_id } => flight_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlightEvent::Delivered { .. } | FlightEvent::Cancelled { .. }
        )
    }

    pub(crate) fn delivered(flight_id: &str, result: &JourneyResult) -> Self {
        FlightEvent::Delivered {
            flight_id: flight_id.to_string(),
            result: result.clone(),
        }
    }
}
