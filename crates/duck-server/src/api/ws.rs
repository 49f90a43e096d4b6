//! WebSocket streaming of flight events.
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    flight_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsQuery>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.flight_id))
        .into_response()
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, flight_filter: Option<String>) {
    let mut rx = state.simulator().subscribe();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(flight_id) = flight_filter.as_deref() {
                            if event.flight_id() != flight_id {
                                continue;
                            }
                        }
                        let payload = match serde_json::to_string(&event) {
                            Ok(payload) => payload,
                            Err(err) => {
                                tracing::warn!("Failed to encode flight event: {}", err);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("WebSocket client lagged, dropped {} event(s)", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}
