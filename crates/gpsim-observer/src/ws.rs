//! `WebSocket` push channel for live position updates.
//!
//! Clients connect to `GET /ws/position` and receive one JSON text frame
//! per tick:
//!
//! ```json
//! {"event":"gpsData","data":{"servPos":[lat,lon],"angle":123.4}}
//! ```
//!
//! If a client falls behind, lagged messages are silently skipped and
//! the client resumes from the most recent position. Clients may also
//! send `{"autopilot": true}` or `{"speed": 5}` frames, which are applied
//! like the matching REST commands.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use gpsim_types::PositionEvent;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Envelope for one pushed event.
#[derive(Debug, serde::Serialize)]
pub struct PushMessage<'a> {
    /// Event name.
    pub event: &'static str,
    /// Event payload.
    pub data: &'a PositionEvent,
}

/// Serialize a position event into its push frame.
pub fn position_frame(event: &PositionEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PushMessage {
        event: PositionEvent::EVENT_NAME,
        data: event,
    })
}

/// Command frame a client may send.
#[derive(Debug, Default, PartialEq, serde::Deserialize)]
pub struct ClientCommand {
    /// Toggle autopilot.
    pub autopilot: Option<bool>,
    /// New angular speed in degrees per minute.
    pub speed: Option<f64>,
}

/// Apply a client command frame. `autopilot` takes precedence when both
/// fields are present. Returns whether anything was applied.
pub async fn apply_client_command(state: &AppState, command: &ClientCommand) -> bool {
    if let Some(enabled) = command.autopilot {
        info!(autopilot = enabled, "Autopilot requested by client");
        state.controller.set_autopilot(enabled).await
    } else if let Some(speed) = command.speed {
        info!(speed, "Speed requested by client");
        state.controller.set_speed(speed).await
    } else {
        false
    }
}

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming positions.
///
/// # Route
///
/// `GET /ws/position`
pub async fn ws_position(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Handle the `WebSocket` lifecycle: subscribe on connect, forward each
/// event as a text frame, apply inbound commands, and unsubscribe on
/// disconnect by dropping the receiver.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let mut rx = state.subscribe();
    info!(viewers = state.subscriber_count(), "WebSocket client connected");

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let json = match position_frame(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize position event: {e}");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            debug!("WebSocket client disconnected (send failed)");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged, skipping ahead");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed, shutting down WebSocket");
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientCommand>(text.as_str()) {
                            Ok(command) => {
                                if !apply_client_command(&state, &command).await {
                                    debug!(?command, "Client command not applied");
                                }
                            }
                            Err(e) => debug!("Ignoring malformed client frame: {e}"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    drop(rx);
    info!(viewers = state.subscriber_count(), "WebSocket client removed");
}
