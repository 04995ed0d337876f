//! Shared type definitions for the gpsim GPS receiver simulator.
//!
//! Types defined here cross crate boundaries: the engine produces them,
//! the control API serializes them, and the map UI consumes them through
//! `TypeScript` bindings generated by `ts-rs`.
//!
//! # Modules
//!
//! - [`enums`] -- Simulation mode and serial port status
//! - [`structs`] -- Coordinates, position events, and status snapshots

pub mod enums;
pub mod structs;

pub use enums::{PortStatus, SimulationMode};
pub use structs::{CoordinateError, GeoPoint, PositionEvent, StatusSnapshot};
