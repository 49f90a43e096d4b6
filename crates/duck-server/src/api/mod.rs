//! API routes for the duck server.

pub mod flights;
pub mod ws;

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route(
            "/v1/flights",
            get(flights::list_flights).post(flights::create_flight),
        )
        .route(
            "/v1/flights/:flight_id",
            get(flights::get_flight).delete(flights::cancel_flight),
        )
        .route("/v1/flights/:flight_id/progress", get(flights::get_progress))
        .route("/v1/flights/:flight_id/result", get(flights::get_result))
        .route("/v1/stream", get(ws::ws_handler))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_flights": state.simulator().active_count(),
        "base_speed_kmh": state.simulator().config().base_speed_kmh,
        "live_weather": !state.config().weather_provider_url.is_empty(),
    }))
}
