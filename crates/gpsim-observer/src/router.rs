//! Axum router construction for the control API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled so the map UI can be served from a
//! different origin.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::control;
use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the simulator.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws/position` -- `WebSocket` position stream
/// - `GET /api/ports`, `GET /api/status` -- read-only queries
/// - `POST /api/*` -- session commands (see [`control`])
///
/// CORS allows any origin.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // WebSocket
        .route("/ws/position", get(ws::ws_position))
        // Queries
        .route("/api/ports", get(handlers::list_ports))
        .route("/api/status", get(handlers::status))
        // Commands
        .route("/api/open-port", post(control::open_port))
        .route("/api/close-port", post(control::close_port))
        .route("/api/start-sending", post(control::start_sending))
        .route("/api/stop-sending", post(control::stop_sending))
        .route("/api/update-coordinates", post(control::update_coordinates))
        .route("/api/update-pivot", post(control::update_pivot))
        .route("/api/clear-pivot", post(control::clear_pivot))
        .route("/api/autopilot", post(control::set_autopilot))
        .route("/api/speed", post(control::set_speed))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
