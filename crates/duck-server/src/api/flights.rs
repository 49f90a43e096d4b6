use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use duck_core::{Flight, FlightProgress, JourneyResult, Location, LocationError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::simulator::FlightError;
use crate::state::AppState;

type ApiError = (StatusCode, Json<Value>);

#[derive(Debug, Deserialize)]
pub struct PointRequest {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    anonymous: bool,
}

impl PointRequest {
    fn into_location(self) -> Result<Location, LocationError> {
        let mut location = Location::new(self.latitude, self.longitude)?;
        if let Some(label) = self.label.filter(|label| !label.trim().is_empty()) {
            location = location.with_label(label);
        }
        if self.anonymous {
            location = location.anonymized();
        }
        Ok(location)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateFlightRequest {
    #[serde(default)]
    flight_id: Option<String>,
    start: PointRequest,
    end: PointRequest,
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

fn flight_error(err: FlightError) -> ApiError {
    let status = match &err {
        FlightError::InvalidLocation(_) => StatusCode::BAD_REQUEST,
        FlightError::NoPathFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FlightError::FlightAlreadyActive(_) => StatusCode::CONFLICT,
        FlightError::FlightNotFound(_) => StatusCode::NOT_FOUND,
    };
    error_response(status, err)
}

pub async fn create_flight(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateFlightRequest>,
) -> Result<(StatusCode, Json<Flight>), ApiError> {
    let start = payload
        .start
        .into_location()
        .map_err(|err| error_response(StatusCode::BAD_REQUEST, err))?;
    let end = payload
        .end
        .into_location()
        .map_err(|err| error_response(StatusCode::BAD_REQUEST, err))?;
    let flight_id = payload
        .flight_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("duck-{}", Uuid::new_v4()));

    let flight = state
        .simulator()
        .initialize_flight(flight_id, start, end)
        .await
        .map_err(flight_error)?;
    Ok((StatusCode::CREATED, Json(flight)))
}

pub async fn list_flights(State(state): State<Arc<AppState>>) -> Json<Vec<FlightProgress>> {
    let flights = state.simulator().list_active_flights();
    Json(flights.iter().map(Flight::progress).collect())
}

pub async fn get_flight(
    State(state): State<Arc<AppState>>,
    Path(flight_id): Path<String>,
) -> Result<Json<Flight>, StatusCode> {
    state
        .simulator()
        .get_record(&flight_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(flight_id): Path<String>,
) -> Result<Json<FlightProgress>, StatusCode> {
    state
        .simulator()
        .get_progress(&flight_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(flight_id): Path<String>,
) -> Result<Json<JourneyResult>, StatusCode> {
    state
        .simulator()
        .compute_journey_result(&flight_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn cancel_flight(
    State(state): State<Arc<AppState>>,
    Path(flight_id): Path<String>,
) -> StatusCode {
    if state.simulator().cancel_flight(&flight_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
