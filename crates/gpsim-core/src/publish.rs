//! Fan-out of position events to connected viewers.
//!
//! The session controller hands every emitted [`PositionEvent`] to a
//! [`PositionPublisher`]. Publishing must never block the tick, so the
//! production implementation is a bounded [`broadcast`] channel: each
//! subscriber owns a receiver, a slow one lags and skips ahead, and a
//! dropped one simply disappears from the channel.

use gpsim_types::PositionEvent;
use tokio::sync::broadcast;

/// Sink for per-tick position events.
pub trait PositionPublisher: Send + Sync {
    /// Deliver `event` to all current subscribers.
    ///
    /// Returns the number of subscribers the event was queued for.
    fn publish(&self, event: &PositionEvent) -> usize;
}

impl PositionPublisher for broadcast::Sender<PositionEvent> {
    fn publish(&self, event: &PositionEvent) -> usize {
        // Err only means nobody is subscribed right now.
        self.send(*event).unwrap_or(0)
    }
}

/// Publisher that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPublisher;

impl PositionPublisher for NoOpPublisher {
    fn publish(&self, _event: &PositionEvent) -> usize {
        0
    }
}
