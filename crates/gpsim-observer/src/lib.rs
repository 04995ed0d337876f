//! Control API server for the GPS receiver simulator.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **Command endpoints** (`POST /api/*`) for opening the serial port,
//!   starting and stopping the engine, and reconfiguring the target,
//!   pivot, autopilot and speed
//! - **Query endpoints** for the device list and a status snapshot
//! - **`WebSocket` endpoint** (`/ws/position`) that pushes every emitted
//!   position via [`tokio::sync::broadcast`]
//! - **Minimal HTML page** (`GET /`) showing the session status
//!
//! All handlers go through one shared
//! [`SessionController`](gpsim_core::session::SessionController), so
//! commands are serialized with the tick loop.

pub mod control;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::{StartupError, spawn_observer};
pub use state::AppState;
