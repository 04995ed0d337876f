//! Shared application state for the control API server.
//!
//! [`AppState`] bundles the [`SessionController`] that every command
//! handler drives and the broadcast channel the engine publishes
//! position events into. Each `WebSocket` client subscribes to the
//! channel on connect and drops its receiver on disconnect, so the
//! channel doubles as the live subscriber registry.

use std::sync::Arc;

use gpsim_core::clock::{SystemClock, TimeSource};
use gpsim_core::config::GpsimConfig;
use gpsim_core::serial::{self, SerialError};
use gpsim_core::session::{SessionController, SessionSettings};
use gpsim_types::PositionEvent;
use tokio::sync::broadcast;

/// Default capacity of the position broadcast channel.
///
/// A subscriber that falls behind by more than this many events gets a
/// [`broadcast::error::RecvError::Lagged`] and skips to the newest one.
pub const BROADCAST_CAPACITY: usize = 256;

/// Enumerates serial devices for `GET /api/ports`.
pub type PortLister = Arc<dyn Fn() -> Result<Vec<String>, SerialError> + Send + Sync>;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// The single simulation session.
    pub controller: SessionController,
    /// Broadcast sender for position events.
    pub tx: broadcast::Sender<PositionEvent>,
    /// Serial device enumeration.
    pub port_lister: PortLister,
}

impl AppState {
    /// Create state with default settings and the system clock.
    pub fn new() -> Self {
        Self::with_parts(
            SessionSettings::default(),
            BROADCAST_CAPACITY,
            Arc::new(SystemClock),
        )
    }

    /// Create state from loaded configuration.
    pub fn from_config(config: &GpsimConfig) -> Self {
        Self::with_parts(
            SessionSettings::from(config),
            config.simulation.broadcast_capacity,
            Arc::new(SystemClock),
        )
    }

    /// Create state from explicit parts.
    ///
    /// The controller publishes into a fresh broadcast channel of
    /// `capacity` (at least 1) and stamps sentences with `clock`.
    pub fn with_parts(
        settings: SessionSettings,
        capacity: usize,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let controller = SessionController::new(settings, Arc::new(tx.clone()), clock);
        Self {
            controller,
            tx,
            port_lister: Arc::new(serial::list_ports),
        }
    }

    /// Replace the serial device enumerator.
    #[must_use]
    pub fn with_port_lister(mut self, lister: PortLister) -> Self {
        self.port_lister = lister;
        self
    }

    /// Subscribe to the position event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PositionEvent> {
        self.tx.subscribe()
    }

    /// Number of currently connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
