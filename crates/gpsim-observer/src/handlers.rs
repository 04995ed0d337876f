//! Read-only endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/ports` | Serial devices available to open |
//! | `GET` | `/api/status` | Session status snapshot |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use gpsim_types::PortStatus;
use tracing::error;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing the session status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.controller.status().await;
    let port = PortStatus::from_code(status.status).map_or("UNKNOWN", PortStatus::label);
    let mode = format!("{:?}", status.mode);
    let position = status
        .position
        .map_or_else(|| String::from("--"), |p| p.to_string());
    let viewers = state.subscriber_count();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>gpsim</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
        }}
        .label {{ color: #8b949e; font-size: 0.85rem; }}
        .value {{ color: #58a6ff; font-size: 1.2rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
    </style>
</head>
<body>
    <h1>gpsim</h1>
    <div>
        <div class="metric"><div class="label">Port</div><div class="value">{port}</div></div>
        <div class="metric"><div class="label">Mode</div><div class="value">{mode}</div></div>
        <div class="metric"><div class="label">Position</div><div class="value">{position}</div></div>
        <div class="metric"><div class="label">Viewers</div><div class="value">{viewers}</div></div>
    </div>
    <p><a href="/api/status">/api/status</a> &middot; <a href="/api/ports">/api/ports</a></p>
    <p><code>ws://host:port/ws/position</code> -- live position stream</p>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/ports
// ---------------------------------------------------------------------------

/// List serial devices that can be opened.
pub async fn list_ports(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let lister = Arc::clone(&state.port_lister);
    let ports = tokio::task::spawn_blocking(move || lister())
        .await
        .map_err(|e| ApiError::Internal(format!("port listing task failed: {e}")))?
        .map_err(|e| {
            error!(error = %e, "Failed to list ports");
            ApiError::Internal(String::from("Failed to list ports"))
        })?;
    Ok(Json(ports))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Return the current session status.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.status().await)
}
