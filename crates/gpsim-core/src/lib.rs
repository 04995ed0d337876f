//! Position simulation, NMEA encoding, and session control for gpsim.
//!
//! This crate owns the simulated GPS receiver: it computes one position
//! per tick, encodes it as a `$GNGGA` sentence, writes it to a serial
//! device, and publishes it to connected viewers.
//!
//! # Modules
//!
//! - [`geo`] -- Spherical-earth destination point, bearing, and distance.
//! - [`nmea`] -- GGA sentence encoding and checksums.
//! - [`motion`] -- Simulation state, pivot configuration, and the
//!   manual/autopilot step.
//! - [`serial`] -- Serial output transport, device and in-memory ports.
//! - [`writer`] -- Per-port output queue that keeps device I/O off the
//!   session lock.
//! - [`publish`] -- Position event fan-out.
//! - [`clock`] -- UTC time-of-day sources.
//! - [`session`] -- [`SessionController`]: commands, tick loop, status.
//! - [`config`] -- Configuration loading from `gpsim-config.yaml`.
//!
//! [`SessionController`]: session::SessionController

pub mod clock;
pub mod config;
pub mod geo;
pub mod motion;
pub mod nmea;
pub mod publish;
pub mod serial;
pub mod session;
pub mod writer;

pub use clock::{FixedClock, SystemClock, TimeSource};
pub use config::{ConfigError, GpsimConfig};
pub use motion::{PivotConfig, PivotError, SimulationState};
pub use publish::{NoOpPublisher, PositionPublisher};
pub use serial::{DevicePort, MemoryPort, SerialError, SerialPort};
pub use session::{SessionController, SessionError, SessionSettings, TickOutcome};
pub use writer::OUTPUT_QUEUE_DEPTH;
