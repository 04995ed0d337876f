//! Session controller: the single owner of simulation state.
//!
//! [`SessionController`] serializes every mutation of the process-wide
//! [`SimulationState`] through one [`tokio::sync::Mutex`]. Inbound
//! commands take the lock, mutate, and return without waiting for a
//! tick. The periodic ticker takes the same lock for the
//! read-compute-queue-publish step, so a tick never observes a
//! half-applied pivot update. Device I/O happens on the port's writer
//! task (see [`crate::writer`]), never under the lock, so a stalled
//! device cannot hold up commands.
//!
//! # Tick loop lifecycle
//!
//! `start` spawns a ticker task tagged with a fresh generation number;
//! `stop` clears `running`, bumps the generation, and aborts the task.
//! Both happen under the state lock, and every tick re-checks `running`
//! and its generation under that lock before queueing a sentence. The
//! writer checks the generation again before each write, so once `stop`
//! returns nothing queued by the stopped run reaches the device.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gpsim_types::{GeoPoint, PortStatus, PositionEvent, SimulationMode, StatusSnapshot};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::TimeSource;
use crate::config::GpsimConfig;
use crate::motion::{PivotConfig, SimulationState};
use crate::nmea::{LINE_TERMINATOR, encode_position_sentence};
use crate::publish::PositionPublisher;
use crate::serial::{DevicePort, PortSettings, SerialError, SerialPort};
use crate::writer::{PortWriter, QueueError};

/// Errors surfaced to command callers.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `start` was requested without an open serial device.
    #[error("Serial port not open")]
    PortNotOpen,

    /// The serial device failed to open.
    #[error("failed to open serial port {path}: {source}")]
    PortOpen {
        /// Requested device path.
        path: String,
        /// The underlying serial error.
        source: SerialError,
    },

    /// The serial device failed to close cleanly.
    #[error("failed to close serial port: {source}")]
    PortClose {
        /// The underlying serial error.
        #[from]
        source: SerialError,
    },
}

/// Runtime settings for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    /// Period of the tick loop.
    pub tick_interval: Duration,
    /// Speed reported while no pivot is configured.
    pub default_speed_deg_per_min: f64,
    /// Baud rate used when an open request does not name one.
    pub default_baud_rate: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&GpsimConfig::default())
    }
}

impl From<&GpsimConfig> for SessionSettings {
    fn from(config: &GpsimConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.simulation.tick_interval_ms),
            default_speed_deg_per_min: config.simulation.default_speed_deg_per_min,
            default_baud_rate: config.serial.default_baud_rate,
        }
    }
}

/// Result of one tick attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// The engine is stopped or the ticker belongs to an earlier start.
    Stale,
    /// The engine ran but has no position to emit yet.
    Idle,
    /// A sentence was produced for the device and the event published.
    Emitted(PositionEvent),
}

struct Session {
    state: SimulationState,
    writer: Option<PortWriter>,
    port_status: PortStatus,
    ticker: Option<JoinHandle<()>>,
    /// Shared with the port writer, which drops sentences of older runs.
    generation: Arc<AtomicU64>,
}

impl Session {
    fn port_is_open(&self) -> bool {
        self.writer.as_ref().is_some_and(PortWriter::is_open)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stop ticking. Safe to call when already stopped.
    fn halt(&mut self) {
        self.state.running = false;
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
        if self.port_status == PortStatus::Sending {
            self.port_status = PortStatus::Open;
        }
    }

    /// Stop the engine and detach the port. The caller shuts the returned
    /// writer down after releasing the lock.
    fn detach_port(&mut self) -> Option<PortWriter> {
        self.halt();
        self.port_status = PortStatus::Closed;
        self.writer.take()
    }
}

/// Close a detached port, logging instead of failing.
async fn retire(writer: Option<PortWriter>) {
    let Some(writer) = writer else {
        return;
    };
    if let Err(e) = writer.shutdown().await {
        warn!(error = %e, "Failed to close previous port");
    }
}

/// Coordinates commands and the tick loop over one simulation session.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    session: Arc<Mutex<Session>>,
    publisher: Arc<dyn PositionPublisher>,
    clock: Arc<dyn TimeSource>,
    settings: SessionSettings,
}

impl SessionController {
    /// Create a controller with a closed port and an idle manual-mode state.
    pub fn new(
        settings: SessionSettings,
        publisher: Arc<dyn PositionPublisher>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session {
                state: SimulationState::new(),
                writer: None,
                port_status: PortStatus::Closed,
                ticker: None,
                generation: Arc::new(AtomicU64::new(0)),
            })),
            publisher,
            clock,
            settings,
        }
    }

    /// Settings this controller was built with.
    pub const fn settings(&self) -> SessionSettings {
        self.settings
    }

    // -----------------------------------------------------------------------
    // Serial port
    // -----------------------------------------------------------------------

    /// Open a serial device and make it the session's output.
    ///
    /// Any previously open port is closed first, which also stops the
    /// engine. On failure the port status is `Closed`.
    pub async fn open_port(&self, path: &str, baud_rate: Option<u32>) -> Result<(), SessionError> {
        let settings = PortSettings::with_baud(baud_rate.unwrap_or(self.settings.default_baud_rate));
        let owned_path = path.to_owned();
        let opened = tokio::task::spawn_blocking(move || DevicePort::open(&owned_path, settings))
            .await
            .unwrap_or_else(|e| {
                Err(SerialError::Open {
                    path: path.to_owned(),
                    source: serialport::Error::new(serialport::ErrorKind::Unknown, e.to_string()),
                })
            });

        match opened {
            Ok(port) => {
                self.attach_port(Box::new(port)).await;
                Ok(())
            }
            Err(source) => {
                let previous = self.session.lock().await.detach_port();
                retire(previous).await;
                warn!(path, error = %source, "Serial port open failed");
                Err(SessionError::PortOpen {
                    path: path.to_owned(),
                    source,
                })
            }
        }
    }

    /// Install an already-open port as the session's output.
    ///
    /// A previously attached port is closed and the engine stopped.
    pub async fn attach_port(&self, port: Box<dyn SerialPort>) {
        let previous = {
            let mut session = self.session.lock().await;
            let previous = session.detach_port();
            let writer = PortWriter::spawn(port, Arc::clone(&session.generation));
            info!(path = writer.path(), "Serial port attached");
            session.writer = Some(writer);
            session.port_status = PortStatus::Open;
            previous
        };
        retire(previous).await;
    }

    /// Stop the engine and close the port. Succeeds when nothing is open.
    pub async fn close_port(&self) -> Result<(), SessionError> {
        let writer = self.session.lock().await.detach_port();
        if let Some(writer) = writer {
            writer.shutdown().await?;
            info!("Serial port closed");
        }
        Ok(())
    }

    /// Wait until every sentence queued so far has been written to the
    /// device or discarded. Returns at once when no port is attached.
    pub async fn flush_output(&self) {
        let handle = self
            .session
            .lock()
            .await
            .writer
            .as_ref()
            .map(PortWriter::flush_handle);
        if let Some(handle) = handle {
            handle.flush().await;
        }
    }

    // -----------------------------------------------------------------------
    // Engine lifecycle
    // -----------------------------------------------------------------------

    /// Start (or restart) the tick loop, optionally with a new target.
    ///
    /// Fails with [`SessionError::PortNotOpen`] when no open port is
    /// attached; the state is left untouched in that case.
    pub async fn start(&self, target: Option<GeoPoint>) -> Result<(), SessionError> {
        let mut session = self.session.lock().await;
        if !session.port_is_open() {
            warn!("Start requested without an open serial port");
            return Err(SessionError::PortNotOpen);
        }

        if let Some(target) = target {
            session.state.set_manual_target(target);
        }
        if session.state.pivot.is_some() {
            info!(target_angle = session.state.target_angle_deg, "Target angle");
        }

        session.halt();
        session.state.running = true;
        session.port_status = PortStatus::Sending;
        let generation = session.generation();
        session.ticker = Some(self.spawn_ticker(generation));

        info!(
            generation,
            interval = ?self.settings.tick_interval,
            mode = ?session.state.mode,
            "Engine started"
        );
        Ok(())
    }

    /// Stop the tick loop. Idempotent.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        let was_running = session.state.running;
        session.halt();
        if was_running {
            info!("Engine stopped");
        }
    }

    /// Whether the tick loop is active.
    pub async fn is_running(&self) -> bool {
        self.session.lock().await.state.running
    }

    fn spawn_ticker(&self, generation: u64) -> JoinHandle<()> {
        let controller = self.clone();
        let period = self.settings.tick_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if controller.run_tick(generation).await == TickOutcome::Stale {
                    debug!(generation, "Ticker retired");
                    return;
                }
            }
        })
    }

    /// Run one tick immediately if the engine is running.
    ///
    /// Behaves exactly like a scheduled tick of the current generation.
    pub async fn tick_now(&self) -> TickOutcome {
        let generation = self.session.lock().await.generation();
        self.run_tick(generation).await
    }

    async fn run_tick(&self, generation: u64) -> TickOutcome {
        let mut session = self.session.lock().await;
        if !session.state.running || session.generation() != generation {
            return TickOutcome::Stale;
        }

        let Some(event) = session.state.advance(self.settings.tick_interval) else {
            return TickOutcome::Idle;
        };

        let sentence = encode_position_sentence(event.position, self.clock.now());
        match session.writer.as_ref() {
            Some(writer) => match writer.queue(generation, format!("{sentence}{LINE_TERMINATOR}")) {
                Ok(()) => debug!(%sentence, "Queued"),
                Err(QueueError::Full) => {
                    warn!(%sentence, "Serial device is not keeping up, sentence dropped");
                }
                Err(QueueError::Closed) => warn!(%sentence, "Serial writer gone, sentence dropped"),
            },
            None => warn!(%sentence, "No serial port attached, sentence dropped"),
        }

        let receivers = self.publisher.publish(&event);
        debug!(receivers, angle = event.bearing_from_pivot_deg, "Position published");
        TickOutcome::Emitted(event)
    }

    // -----------------------------------------------------------------------
    // Reconfiguration
    // -----------------------------------------------------------------------

    /// Replace the manual target; the target bearing is refreshed at once.
    pub async fn set_manual_target(&self, target: GeoPoint) {
        let mut session = self.session.lock().await;
        session.state.set_manual_target(target);
        if session.state.pivot.is_some() {
            info!(target_angle = session.state.target_angle_deg, "Target angle");
        }
    }

    /// Replace the pivot from possibly-missing parts.
    ///
    /// Returns `false` and keeps the previous pivot when any part is
    /// missing or not strictly positive.
    pub async fn set_pivot(
        &self,
        center: Option<GeoPoint>,
        radius_m: Option<f64>,
        speed_deg_per_min: Option<f64>,
    ) -> bool {
        let pivot = match PivotConfig::from_parts(center, radius_m, speed_deg_per_min) {
            Ok(pivot) => pivot,
            Err(e) => {
                warn!(error = %e, "Pivot update rejected");
                return false;
            }
        };
        let mut session = self.session.lock().await;
        session.state.set_pivot(pivot);
        info!(
            radius_m = pivot.radius_m,
            center = %pivot.center,
            speed = pivot.speed_deg_per_min,
            "Pivot set"
        );
        true
    }

    /// Remove the pivot and force manual mode.
    pub async fn clear_pivot(&self) {
        let mut session = self.session.lock().await;
        session.state.clear_pivot();
        info!("Pivot cleared");
    }

    /// Enable or disable autopilot.
    ///
    /// Only honored while the engine is running; enabling also requires a
    /// pivot. Returns whether the change was applied.
    pub async fn set_autopilot(&self, enabled: bool) -> bool {
        let mut session = self.session.lock().await;
        if !session.state.running {
            debug!(enabled, "Autopilot change ignored while stopped");
            return false;
        }
        let mode = if enabled {
            SimulationMode::Autopilot
        } else {
            SimulationMode::Manual
        };
        let applied = session.state.set_mode(mode);
        if applied {
            info!(autopilot = enabled, "Autopilot");
        } else {
            warn!("Autopilot requested without a pivot");
        }
        applied
    }

    /// Change the angular speed; effective from the next tick.
    pub async fn set_speed(&self, speed_deg_per_min: f64) -> bool {
        let mut session = self.session.lock().await;
        let applied = session.state.set_speed(speed_deg_per_min);
        if applied {
            info!(speed = speed_deg_per_min, "Speed set");
        } else {
            warn!(speed = speed_deg_per_min, "Speed change rejected");
        }
        applied
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Snapshot of the session for the status endpoint.
    pub async fn status(&self) -> StatusSnapshot {
        let session = self.session.lock().await;
        let state = &session.state;
        StatusSnapshot {
            status: session.port_status.code(),
            autopilot: state.mode == SimulationMode::Autopilot,
            mode: state.mode,
            coords: state.manual_target,
            pivot_center: state.pivot.map(|p| p.center),
            pivot_radius: state.pivot.map(|p| p.radius_m),
            speed: state
                .pivot
                .map_or(self.settings.default_speed_deg_per_min, |p| p.speed_deg_per_min),
            position: state.current_position,
            current_angle: state.current_angle_deg,
        }
    }

    /// Copy of the current simulation state.
    pub async fn state(&self) -> SimulationState {
        self.session.lock().await.state.clone()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc as std_mpsc;

    use super::*;
    use crate::clock::FixedClock;
    use crate::nmea::has_valid_checksum;
    use crate::serial::MemoryPort;
    use crate::writer::OUTPUT_QUEUE_DEPTH;

    /// A device whose writes block until the test releases them.
    struct StalledPort {
        release: std_mpsc::Receiver<()>,
        writes: Arc<AtomicUsize>,
    }

    impl SerialPort for StalledPort {
        fn path(&self) -> &str {
            "stalled0"
        }

        fn is_open(&self) -> bool {
            true
        }

        fn write(&mut self, _bytes: &[u8]) -> Result<(), SerialError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let _ = self.release.recv();
            Ok(())
        }

        fn close(&mut self) -> Result<(), SerialError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        events: StdMutex<Vec<PositionEvent>>,
    }

    impl RecordingPublisher {
        fn events(&self) -> Vec<PositionEvent> {
            self.events.lock().map(|e| e.clone()).unwrap_or_default()
        }
    }

    impl PositionPublisher for RecordingPublisher {
        fn publish(&self, event: &PositionEvent) -> usize {
            if let Ok(mut events) = self.events.lock() {
                events.push(*event);
            }
            1
        }
    }

    fn controller() -> (SessionController, Arc<RecordingPublisher>) {
        controller_with(SessionSettings::default())
    }

    fn controller_with(settings: SessionSettings) -> (SessionController, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let controller = SessionController::new(
            settings,
            Arc::clone(&publisher) as Arc<dyn PositionPublisher>,
            Arc::new(FixedClock::at(12, 0, 0)),
        );
        (controller, publisher)
    }

    async fn with_port(controller: &SessionController) -> MemoryPort {
        let port = MemoryPort::new("mem0");
        controller.attach_port(Box::new(port.clone())).await;
        port
    }

    #[tokio::test]
    async fn start_without_port_fails() {
        let (controller, _) = controller();
        let result = controller.start(Some(GeoPoint::new(1.0, 2.0))).await;
        assert!(matches!(result, Err(SessionError::PortNotOpen)));
        assert!(!controller.is_running().await);
        assert_eq!(controller.status().await.status, 0);
    }

    #[tokio::test]
    async fn start_with_closed_port_fails() {
        let (controller, _) = controller();
        let port = with_port(&controller).await;
        let mut handle = port.clone();
        let _ = handle.close();
        let result = controller.start(None).await;
        assert!(matches!(result, Err(SessionError::PortNotOpen)));
    }

    #[tokio::test]
    async fn manual_tick_writes_exact_target() {
        let (controller, publisher) = controller();
        let port = with_port(&controller).await;
        controller.start(None).await.unwrap_or_else(|e| panic!("{e}"));
        controller.set_manual_target(GeoPoint::new(10.0, 20.0)).await;

        let outcome = controller.tick_now().await;
        assert_eq!(
            outcome,
            TickOutcome::Emitted(PositionEvent {
                position: GeoPoint::new(10.0, 20.0),
                bearing_from_pivot_deg: 0.0,
            })
        );
        assert_eq!(
            controller.state().await.current_position,
            Some(GeoPoint::new(10.0, 20.0))
        );

        controller.flush_output().await;
        let lines = port.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines.first().map(String::as_str),
            Some("$GNGGA,120000.000,1000.0000,N,02000.0000,E,1,10,2.0,230.1,M,46.9,M,,*4A")
        );
        assert!(lines.iter().all(|l| has_valid_checksum(l)));
        assert!(port.contents().ends_with("\r\n"));
        assert_eq!(publisher.events().len(), 1);
    }

    #[tokio::test]
    async fn tick_without_target_is_idle() {
        let (controller, publisher) = controller();
        let port = with_port(&controller).await;
        controller.start(None).await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(controller.tick_now().await, TickOutcome::Idle);
        assert!(port.contents().is_empty());
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn late_tick_after_stop_is_inert() {
        let (controller, publisher) = controller();
        let port = with_port(&controller).await;
        controller
            .start(Some(GeoPoint::new(1.0, 1.0)))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        let stale_generation = controller.session.lock().await.generation();
        controller.stop().await;

        assert_eq!(controller.run_tick(stale_generation).await, TickOutcome::Stale);
        assert_eq!(controller.tick_now().await, TickOutcome::Stale);
        controller.flush_output().await;
        assert!(port.contents().is_empty());
        assert!(publisher.events().is_empty());
        assert_eq!(controller.status().await.status, 1);
    }

    #[tokio::test]
    async fn restart_retires_previous_ticker() {
        let (controller, publisher) = controller();
        let _port = with_port(&controller).await;
        controller
            .start(Some(GeoPoint::new(1.0, 1.0)))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        let first = controller.session.lock().await.generation();
        controller.start(None).await.unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(controller.run_tick(first).await, TickOutcome::Stale);
        assert!(publisher.events().is_empty());
        assert!(matches!(controller.tick_now().await, TickOutcome::Emitted(_)));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (controller, _) = controller();
        controller.stop().await;
        controller.stop().await;
        assert!(!controller.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_emits_once_per_period_until_stopped() {
        let (controller, publisher) = controller();
        let port = with_port(&controller).await;
        controller
            .start(Some(GeoPoint::new(5.0, 5.0)))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(controller.status().await.status, 2);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        controller.flush_output().await;
        assert_eq!(port.lines().len(), 3);

        controller.stop().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        controller.flush_output().await;
        assert_eq!(port.lines().len(), 3);
        assert_eq!(publisher.events().len(), 3);
    }

    #[tokio::test]
    async fn write_failure_keeps_engine_running() {
        let (controller, publisher) = controller();
        let port = with_port(&controller).await;
        controller
            .start(Some(GeoPoint::new(1.0, 1.0)))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        port.set_fail_writes(true);

        assert!(matches!(controller.tick_now().await, TickOutcome::Emitted(_)));
        controller.flush_output().await;
        assert!(controller.is_running().await);
        assert_eq!(publisher.events().len(), 1);

        port.set_fail_writes(false);
        assert!(matches!(controller.tick_now().await, TickOutcome::Emitted(_)));
        controller.flush_output().await;
        assert_eq!(port.lines().len(), 1);
    }

    #[tokio::test]
    async fn invalid_pivot_keeps_previous() {
        let (controller, _) = controller();
        let center = Some(GeoPoint::new(0.0, 0.0));
        assert!(controller.set_pivot(center, Some(100.0), Some(6.0)).await);

        assert!(!controller.set_pivot(center, Some(0.0), Some(6.0)).await);
        assert!(!controller.set_pivot(Some(GeoPoint::new(5.0, 5.0)), Some(50.0), None).await);

        let status = controller.status().await;
        assert_eq!(status.pivot_center, Some(GeoPoint::new(0.0, 0.0)));
        assert_eq!(status.pivot_radius, Some(100.0));
        assert_eq!(status.speed, 6.0);
    }

    #[tokio::test]
    async fn autopilot_only_while_running() {
        let (controller, _) = controller();
        let _port = with_port(&controller).await;
        assert!(
            controller
                .set_pivot(Some(GeoPoint::new(0.0, 0.0)), Some(100.0), Some(60.0))
                .await
        );
        assert!(!controller.set_autopilot(true).await);
        assert!(!controller.status().await.autopilot);

        controller.start(None).await.unwrap_or_else(|e| panic!("{e}"));
        assert!(controller.set_autopilot(true).await);
        assert!(controller.status().await.autopilot);
        assert!(controller.set_autopilot(false).await);
        assert_eq!(controller.status().await.mode, SimulationMode::Manual);
    }

    #[tokio::test]
    async fn autopilot_sweeps_toward_target() {
        let (controller, publisher) = controller();
        let _port = with_port(&controller).await;
        assert!(
            controller
                .set_pivot(Some(GeoPoint::new(0.0, 0.0)), Some(100.0), Some(300.0))
                .await
        );
        controller
            .start(Some(GeoPoint::new(0.0, 0.001)))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(controller.set_autopilot(true).await);

        // Target bearing changes to 180 immediately; steps of 5 degrees follow.
        controller.set_manual_target(GeoPoint::new(-0.001, 0.0)).await;
        assert!((controller.state().await.target_angle_deg - 180.0).abs() < 1e-9);

        for _ in 0..3 {
            let _ = controller.tick_now().await;
        }
        let angles: Vec<f64> = publisher
            .events()
            .iter()
            .map(|e| e.bearing_from_pivot_deg)
            .collect();
        assert_eq!(angles.len(), 3);
        for (angle, expected) in angles.iter().zip([95.0, 100.0, 105.0]) {
            assert!((angle - expected).abs() < 1e-6, "{angle} vs {expected}");
        }

        assert!(controller.set_speed(600.0).await);
        let _ = controller.tick_now().await;
        assert!((controller.state().await.current_angle_deg - 115.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn clear_pivot_returns_to_manual() {
        let (controller, _) = controller();
        let _port = with_port(&controller).await;
        let _ = controller
            .set_pivot(Some(GeoPoint::new(0.0, 0.0)), Some(100.0), Some(60.0))
            .await;
        controller
            .start(Some(GeoPoint::new(0.0, 0.001)))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(controller.set_autopilot(true).await);

        controller.clear_pivot().await;
        let status = controller.status().await;
        assert!(!status.autopilot);
        assert_eq!(status.pivot_center, None);
        assert_eq!(status.speed, 1.0);

        let outcome = controller.tick_now().await;
        assert_eq!(
            outcome,
            TickOutcome::Emitted(PositionEvent {
                position: GeoPoint::new(0.0, 0.001),
                bearing_from_pivot_deg: 0.0,
            })
        );
    }

    #[tokio::test]
    async fn close_port_stops_engine() {
        let (controller, _) = controller();
        let port = with_port(&controller).await;
        controller
            .start(Some(GeoPoint::new(1.0, 1.0)))
            .await
            .unwrap_or_else(|e| panic!("{e}"));

        assert!(controller.close_port().await.is_ok());
        assert!(!controller.is_running().await);
        assert!(!port.is_open());
        assert_eq!(controller.status().await.status, 0);
        assert!(controller.close_port().await.is_ok());
        assert!(matches!(
            controller.start(None).await,
            Err(SessionError::PortNotOpen)
        ));
    }

    #[tokio::test]
    async fn attaching_new_port_closes_old_one() {
        let (controller, _) = controller();
        let first = with_port(&controller).await;
        controller
            .start(Some(GeoPoint::new(1.0, 1.0)))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        let second = with_port(&controller).await;

        assert!(!first.is_open());
        assert!(second.is_open());
        assert!(!controller.is_running().await);
        assert_eq!(controller.status().await.status, 1);
    }

    #[tokio::test]
    async fn open_port_failure_reports_and_stays_closed() {
        let (controller, _) = controller();
        let result = controller.open_port("/nonexistent/gpsim-tty", Some(9600)).await;
        assert!(matches!(result, Err(SessionError::PortOpen { .. })));
        assert_eq!(controller.status().await.status, 0);
    }

    #[tokio::test]
    async fn status_reports_targets_and_defaults() {
        let (controller, _) = controller();
        controller.set_manual_target(GeoPoint::new(3.0, 4.0)).await;
        let status = controller.status().await;
        assert_eq!(status.coords, Some(GeoPoint::new(3.0, 4.0)));
        assert_eq!(status.speed, 1.0);
        assert_eq!(status.pivot_radius, None);
        assert_eq!(status.position, None);
    }

    #[tokio::test]
    async fn stalled_device_does_not_block_commands() {
        let (controller, publisher) = controller();
        let (release, blocked) = std_mpsc::channel();
        let writes = Arc::new(AtomicUsize::new(0));
        controller
            .attach_port(Box::new(StalledPort {
                release: blocked,
                writes: Arc::clone(&writes),
            }))
            .await;
        controller
            .start(Some(GeoPoint::new(1.0, 1.0)))
            .await
            .unwrap_or_else(|e| panic!("{e}"));

        assert!(matches!(controller.tick_now().await, TickOutcome::Emitted(_)));
        let first_write = tokio::time::timeout(Duration::from_secs(2), async {
            while writes.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(first_write.is_ok());

        // The device is stuck in a write; ticks keep going and overflow the queue.
        for _ in 0..OUTPUT_QUEUE_DEPTH + 4 {
            assert!(matches!(controller.tick_now().await, TickOutcome::Emitted(_)));
        }
        assert_eq!(publisher.events().len(), OUTPUT_QUEUE_DEPTH + 5);

        let limit = Duration::from_secs(2);
        assert!(
            tokio::time::timeout(limit, controller.set_manual_target(GeoPoint::new(2.0, 2.0)))
                .await
                .is_ok()
        );
        assert!(tokio::time::timeout(limit, controller.status()).await.is_ok());
        assert!(tokio::time::timeout(limit, controller.stop()).await.is_ok());
        assert!(!controller.is_running().await);

        drop(release);
        assert!(controller.close_port().await.is_ok());
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_rate_follows_tick_interval() {
        let (controller, _) = controller_with(SessionSettings {
            tick_interval: Duration::from_millis(500),
            ..SessionSettings::default()
        });
        let _port = with_port(&controller).await;
        assert!(
            controller
                .set_pivot(Some(GeoPoint::new(0.0, 0.0)), Some(100.0), Some(60.0))
                .await
        );
        controller
            .start(Some(GeoPoint::new(0.0, 0.001)))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(controller.set_autopilot(true).await);
        controller.set_manual_target(GeoPoint::new(-0.001, 0.0)).await;

        // Twenty half-second ticks at 60 degrees per minute.
        tokio::time::sleep(Duration::from_millis(10_250)).await;
        controller.stop().await;
        let angle = controller.state().await.current_angle_deg;
        assert!((angle - 100.0).abs() < 1e-6, "{angle}");
    }
}
