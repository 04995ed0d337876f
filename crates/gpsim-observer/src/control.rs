//! Command endpoint handlers that drive the simulation session.
//!
//! Every handler performs one short mutation through the
//! [`SessionController`](gpsim_core::session::SessionController) and
//! returns immediately; none waits for the next tick. Response bodies
//! keep the field names the map UI already understands.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/open-port` | Open a serial device |
//! | `POST` | `/api/close-port` | Stop the engine and close the device |
//! | `POST` | `/api/start-sending` | Start the tick loop |
//! | `POST` | `/api/stop-sending` | Stop the tick loop |
//! | `POST` | `/api/update-coordinates` | Set the manual target |
//! | `POST` | `/api/update-pivot` | Set the pivot center, radius, speed |
//! | `POST` | `/api/clear-pivot` | Remove the pivot |
//! | `POST` | `/api/autopilot` | Toggle autopilot |
//! | `POST` | `/api/speed` | Set the angular speed |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use gpsim_types::GeoPoint;
use tracing::{error, info};

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Baud rate as sent by the UI: a number or a numeric string.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum BaudRate {
    /// Numeric form.
    Number(u32),
    /// String form, e.g. `"9600"`.
    Text(String),
}

impl BaudRate {
    /// Parsed value, or `None` for an unparsable string.
    pub fn value(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Request body for `POST /api/open-port`.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPortRequest {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub port_path: String,
    /// Baud rate; the configured default is used when absent.
    pub baud_rate: Option<BaudRate>,
}

/// Request body for `POST /api/start-sending` and
/// `POST /api/update-coordinates`.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatesRequest {
    /// New manual target as `[lat, lon]`.
    pub current_pos: Option<GeoPoint>,
}

/// Request body for `POST /api/update-pivot`.
#[derive(Debug, serde::Deserialize)]
pub struct PivotRequest {
    /// Pivot center as `[lat, lon]`.
    pub center: Option<GeoPoint>,
    /// Radius in meters.
    pub rad: Option<f64>,
    /// Angular speed in degrees per minute.
    pub speed: Option<f64>,
}

/// Request body for `POST /api/autopilot`.
#[derive(Debug, serde::Deserialize)]
pub struct AutopilotRequest {
    /// Desired autopilot state.
    pub autopilot: bool,
}

/// Request body for `POST /api/speed`.
#[derive(Debug, serde::Deserialize)]
pub struct SpeedRequest {
    /// Angular speed in degrees per minute.
    pub speed: f64,
}

// ---------------------------------------------------------------------------
// Serial port
// ---------------------------------------------------------------------------

/// Open a serial device, closing any previously open one.
pub async fn open_port(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OpenPortRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let baud_rate = match &body.baud_rate {
        Some(raw) => Some(raw.value().ok_or_else(|| {
            ApiError::InvalidRequest(format!("unparsable baudRate {raw:?}"))
        })?),
        None => None,
    };

    state
        .controller
        .open_port(&body.port_path, baud_rate)
        .await?;
    info!(path = %body.port_path, ?baud_rate, "Port opened");
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Stop the engine and close the serial device.
pub async fn close_port(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.controller.close_port().await.map_err(|e| {
        error!(error = %e, "Error closing port");
        ApiError::Internal(String::from("Failed to close port"))
    })?;
    Ok(Json(serde_json::json!({ "closed": true })))
}

// ---------------------------------------------------------------------------
// Engine lifecycle
// ---------------------------------------------------------------------------

/// Start the tick loop with an optional initial target.
pub async fn start_sending(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CoordinatesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.controller.start(body.current_pos).await?;
    Ok(Json(serde_json::json!({ "started": true })))
}

/// Stop the tick loop.
pub async fn stop_sending(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.controller.stop().await;
    Json(serde_json::json!({ "stopped": true }))
}

// ---------------------------------------------------------------------------
// Reconfiguration
// ---------------------------------------------------------------------------

/// Replace the manual target. Responds `updated: false` without one.
pub async fn update_coordinates(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CoordinatesRequest>,
) -> impl IntoResponse {
    let updated = body.current_pos.is_some();
    if let Some(target) = body.current_pos {
        state.controller.set_manual_target(target).await;
    }
    Json(serde_json::json!({ "updated": updated }))
}

/// Replace the pivot. Responds `pvtUpdate: false` and keeps the old
/// pivot when any part is missing or invalid.
pub async fn update_pivot(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PivotRequest>,
) -> impl IntoResponse {
    let updated = state
        .controller
        .set_pivot(body.center, body.rad, body.speed)
        .await;
    Json(serde_json::json!({ "pvtUpdate": updated }))
}

/// Remove the pivot and return to manual mode.
pub async fn clear_pivot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.controller.clear_pivot().await;
    Json(serde_json::json!({ "pvtCleared": true }))
}

/// Toggle autopilot. `applied` is `false` while stopped or without a
/// pivot.
pub async fn set_autopilot(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AutopilotRequest>,
) -> impl IntoResponse {
    let applied = state.controller.set_autopilot(body.autopilot).await;
    Json(serde_json::json!({ "autopilot": body.autopilot, "applied": applied }))
}

/// Change the angular speed.
pub async fn set_speed(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SpeedRequest>,
) -> impl IntoResponse {
    let updated = state.controller.set_speed(body.speed).await;
    Json(serde_json::json!({ "speedUpdate": updated }))
}
