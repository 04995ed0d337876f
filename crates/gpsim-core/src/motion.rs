//! Motion engine: simulation state and the per-tick position step.
//!
//! [`SimulationState`] is the single unit of mutable simulation data. The
//! session controller guards it with one mutex, so a tick always sees a
//! consistent mode, target, and pivot.
//!
//! # Modes
//!
//! - **Manual** -- every tick emits the latest target unchanged.
//! - **Autopilot** -- every tick moves the progress angle one step toward
//!   the bearing of the target as seen from the pivot center, along the
//!   shorter arc, then emits the point on the pivot circle at that angle.
//!
//! The autopilot step has no arrival snap. When the remaining gap is not
//! a multiple of the step, the angle keeps stepping back and forth over
//! the target.

use std::time::Duration;

use gpsim_types::{GeoPoint, PositionEvent, SimulationMode};

use crate::geo::{destination_point, initial_bearing, normalize_degrees};

const SECONDS_PER_MINUTE: f64 = 60.0;

/// Errors from pivot validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PivotError {
    /// A required field of the pivot update was absent.
    #[error("invalid pivot config: missing {0}")]
    Missing(&'static str),

    /// The radius was zero, negative, or not finite.
    #[error("invalid pivot config: radius must be > 0, got {0}")]
    Radius(f64),

    /// The speed was zero, negative, or not finite.
    #[error("invalid pivot config: speed must be > 0, got {0}")]
    Speed(f64),
}

/// Center, radius, and angular speed of a circular sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotConfig {
    /// Fixed center of the sweep.
    pub center: GeoPoint,
    /// Sweep radius in meters (> 0).
    pub radius_m: f64,
    /// Angular speed in degrees per minute (> 0).
    pub speed_deg_per_min: f64,
}

impl PivotConfig {
    /// Build a pivot from possibly-missing parts.
    ///
    /// All three parts must be present, and radius and speed must be
    /// finite and strictly positive.
    pub fn from_parts(
        center: Option<GeoPoint>,
        radius_m: Option<f64>,
        speed_deg_per_min: Option<f64>,
    ) -> Result<Self, PivotError> {
        let center = center.ok_or(PivotError::Missing("center"))?;
        let radius_m = radius_m.ok_or(PivotError::Missing("rad"))?;
        let speed_deg_per_min = speed_deg_per_min.ok_or(PivotError::Missing("speed"))?;
        if !is_positive(radius_m) {
            return Err(PivotError::Radius(radius_m));
        }
        if !is_positive(speed_deg_per_min) {
            return Err(PivotError::Speed(speed_deg_per_min));
        }
        Ok(Self {
            center,
            radius_m,
            speed_deg_per_min,
        })
    }

    /// Degrees advanced per tick of `tick_interval`, so the sweep runs
    /// at `speed_deg_per_min` whatever the tick period.
    pub fn progress_per_tick(&self, tick_interval: Duration) -> f64 {
        self.speed_deg_per_min * tick_interval.as_secs_f64() / SECONDS_PER_MINUTE
    }

    /// Point on the sweep circle at `angle_deg`.
    pub fn point_at(&self, angle_deg: f64) -> GeoPoint {
        destination_point(self.center, angle_deg, self.radius_m)
    }
}

/// Finite and strictly positive.
pub(crate) fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Move `current` one step of `rate` degrees toward `target` along the
/// shorter arc of the circle, returning the new angle in `[0, 360)`.
///
/// Equal angles produce no movement. There is no clamping at arrival, so
/// a gap smaller than `rate` is overshot.
pub fn step_toward(current: f64, target: f64, rate: f64) -> f64 {
    let delta = if target > current && target - current > 180.0 {
        -rate
    } else if target < current && current - target > 180.0 {
        rate
    } else if target > current {
        rate
    } else if target < current {
        -rate
    } else {
        0.0
    };
    normalize_degrees(current + delta)
}

/// The process-wide simulation state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationState {
    /// Manual or autopilot.
    pub mode: SimulationMode,
    /// Latest externally supplied target.
    pub manual_target: Option<GeoPoint>,
    /// Sweep configuration; `None` disables autopilot.
    pub pivot: Option<PivotConfig>,
    /// Progress angle around the pivot, in `[0, 360)`.
    pub current_angle_deg: f64,
    /// Bearing of `manual_target` from the pivot center, in `[0, 360)`.
    pub target_angle_deg: f64,
    /// Last emitted position.
    pub current_position: Option<GeoPoint>,
    /// Whether the tick loop is active.
    pub running: bool,
}

impl SimulationState {
    /// Create an idle manual-mode state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the target and refresh the target bearing.
    ///
    /// An autopilot entered before any target existed starts its sweep
    /// at the bearing of the first target.
    pub fn set_manual_target(&mut self, target: GeoPoint) {
        let first_target = self.manual_target.is_none();
        self.manual_target = Some(target);
        self.refresh_target_angle();
        if first_target && self.mode == SimulationMode::Autopilot {
            self.current_angle_deg = self.target_angle_deg;
        }
    }

    /// Replace the pivot wholesale and refresh the target bearing.
    pub fn set_pivot(&mut self, pivot: PivotConfig) {
        self.pivot = Some(pivot);
        self.refresh_target_angle();
    }

    /// Remove the pivot and fall back to manual mode.
    pub fn clear_pivot(&mut self) {
        self.pivot = None;
        self.mode = SimulationMode::Manual;
    }

    /// Switch modes. Returns `false` when autopilot is requested without
    /// a pivot.
    ///
    /// Entering autopilot seeds the progress angle from the last emitted
    /// position so the sweep continues from where the receiver is, or
    /// from the target bearing when nothing has been emitted yet.
    pub fn set_mode(&mut self, mode: SimulationMode) -> bool {
        match mode {
            SimulationMode::Manual => {
                self.mode = SimulationMode::Manual;
                true
            }
            SimulationMode::Autopilot => {
                let Some(pivot) = self.pivot else {
                    return false;
                };
                if self.mode != SimulationMode::Autopilot {
                    self.current_angle_deg = self.current_position.map_or(
                        self.target_angle_deg,
                        |position| initial_bearing(pivot.center, position),
                    );
                }
                self.mode = SimulationMode::Autopilot;
                true
            }
        }
    }

    /// Update the pivot's angular speed. Returns `false` without a pivot
    /// or for a non-positive speed.
    pub fn set_speed(&mut self, speed_deg_per_min: f64) -> bool {
        match self.pivot.as_mut() {
            Some(pivot) if is_positive(speed_deg_per_min) => {
                pivot.speed_deg_per_min = speed_deg_per_min;
                true
            }
            _ => false,
        }
    }

    fn refresh_target_angle(&mut self) {
        if let (Some(pivot), Some(target)) = (self.pivot, self.manual_target) {
            self.target_angle_deg = initial_bearing(pivot.center, target);
        }
    }

    /// Run one simulation step of `tick_interval`.
    ///
    /// Updates `current_position` (and, in autopilot, the progress angle)
    /// and returns the event to publish. Returns `None` and changes
    /// nothing until a target has been supplied, in either mode.
    pub fn advance(&mut self, tick_interval: Duration) -> Option<PositionEvent> {
        let target = self.manual_target?;
        let position = match (self.mode, self.pivot) {
            (SimulationMode::Autopilot, Some(pivot)) => {
                self.current_angle_deg = step_toward(
                    self.current_angle_deg,
                    self.target_angle_deg,
                    pivot.progress_per_tick(tick_interval),
                );
                pivot.point_at(self.current_angle_deg)
            }
            _ => target,
        };
        self.current_position = Some(position);

        let bearing_from_pivot_deg = self
            .pivot
            .map_or(0.0, |pivot| initial_bearing(pivot.center, position));
        Some(PositionEvent {
            position,
            bearing_from_pivot_deg,
        })
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::geo::distance_meters;

    const TICK: Duration = Duration::from_secs(1);

    fn pivot(speed: f64) -> PivotConfig {
        PivotConfig::from_parts(Some(GeoPoint::new(0.0, 0.0)), Some(100.0), Some(speed))
            .unwrap_or_else(|e| panic!("{e}"))
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn step_takes_short_arc_across_north() {
        assert!(close(step_toward(350.0, 10.0, 5.0), 355.0));
        assert!(close(step_toward(10.0, 350.0, 5.0), 5.0));
    }

    #[test]
    fn step_wraps_through_zero() {
        assert!(close(step_toward(358.0, 10.0, 5.0), 3.0));
        assert!(close(step_toward(2.0, 350.0, 5.0), 357.0));
    }

    #[test]
    fn step_moves_directly_when_gap_is_small() {
        assert!(close(step_toward(90.0, 100.0, 1.0), 91.0));
        assert!(close(step_toward(100.0, 90.0, 1.0), 99.0));
    }

    #[test]
    fn step_holds_when_on_target() {
        assert!(close(step_toward(42.0, 42.0, 3.0), 42.0));
    }

    #[test]
    fn step_overshoots_without_snapping() {
        let first = step_toward(10.0, 11.0, 3.0);
        assert!(close(first, 13.0));
        let second = step_toward(first, 11.0, 3.0);
        assert!(close(second, 10.0));
    }

    #[test]
    fn pivot_rejects_missing_or_nonpositive_parts() {
        let c = Some(GeoPoint::new(0.0, 0.0));
        assert_eq!(
            PivotConfig::from_parts(None, Some(1.0), Some(1.0)),
            Err(PivotError::Missing("center"))
        );
        assert_eq!(
            PivotConfig::from_parts(c, None, Some(1.0)),
            Err(PivotError::Missing("rad"))
        );
        assert_eq!(
            PivotConfig::from_parts(c, Some(1.0), None),
            Err(PivotError::Missing("speed"))
        );
        assert_eq!(
            PivotConfig::from_parts(c, Some(0.0), Some(1.0)),
            Err(PivotError::Radius(0.0))
        );
        assert_eq!(
            PivotConfig::from_parts(c, Some(1.0), Some(-2.0)),
            Err(PivotError::Speed(-2.0))
        );
        assert!(PivotConfig::from_parts(c, Some(f64::NAN), Some(1.0)).is_err());
    }

    #[test]
    fn manual_tick_snaps_to_target() {
        let mut state = SimulationState::new();
        state.set_manual_target(GeoPoint::new(10.0, 20.0));
        let event = state.advance(TICK);
        assert_eq!(state.current_position, Some(GeoPoint::new(10.0, 20.0)));
        assert_eq!(
            event,
            Some(PositionEvent {
                position: GeoPoint::new(10.0, 20.0),
                bearing_from_pivot_deg: 0.0,
            })
        );
    }

    #[test]
    fn tick_without_target_emits_nothing() {
        let mut state = SimulationState::new();
        assert_eq!(state.advance(TICK), None);
        assert_eq!(state.current_position, None);
    }

    #[test]
    fn manual_event_reports_bearing_from_pivot() {
        let mut state = SimulationState::new();
        state.set_pivot(pivot(60.0));
        state.set_manual_target(GeoPoint::new(0.0, 0.001));
        let event = state.advance(TICK).unwrap_or_else(|| panic!("no event"));
        assert!(close(event.bearing_from_pivot_deg, 90.0));
    }

    #[test]
    fn target_angle_tracks_target_and_pivot() {
        let mut state = SimulationState::new();
        state.set_manual_target(GeoPoint::new(0.0, -0.001));
        assert_eq!(state.target_angle_deg, 0.0);
        state.set_pivot(pivot(60.0));
        assert!(close(state.target_angle_deg, 270.0));
        state.set_manual_target(GeoPoint::new(-0.001, 0.0));
        assert!(close(state.target_angle_deg, 180.0));
    }

    #[test]
    fn autopilot_requires_pivot() {
        let mut state = SimulationState::new();
        assert!(!state.set_mode(SimulationMode::Autopilot));
        assert_eq!(state.mode, SimulationMode::Manual);
        state.set_pivot(pivot(60.0));
        assert!(state.set_mode(SimulationMode::Autopilot));
        assert_eq!(state.mode, SimulationMode::Autopilot);
    }

    #[test]
    fn clearing_pivot_forces_manual() {
        let mut state = SimulationState::new();
        state.set_pivot(pivot(60.0));
        assert!(state.set_mode(SimulationMode::Autopilot));
        state.clear_pivot();
        assert_eq!(state.mode, SimulationMode::Manual);
        assert!(state.pivot.is_none());
    }

    #[test]
    fn autopilot_advances_along_circle_toward_target() {
        let mut state = SimulationState::new();
        state.set_pivot(pivot(300.0)); // 5 degrees per tick
        state.set_manual_target(GeoPoint::new(0.001, 0.0)); // bearing 0
        state.current_position = Some(state.pivot.map_or(GeoPoint::new(0.0, 0.0), |p| p.point_at(350.0)));
        assert!(state.set_mode(SimulationMode::Autopilot));
        assert!((state.current_angle_deg - 350.0).abs() < 1e-6);

        let event = state.advance(TICK).unwrap_or_else(|| panic!("no event"));
        assert!((state.current_angle_deg - 355.0).abs() < 1e-6);
        assert!((event.bearing_from_pivot_deg - 355.0).abs() < 1e-6);
        let center = GeoPoint::new(0.0, 0.0);
        assert!((distance_meters(center, event.position) - 100.0).abs() < 0.1);

        let _ = state.advance(TICK);
        assert!(state.current_angle_deg < 1e-6 || state.current_angle_deg > 360.0 - 1e-6);
    }

    #[test]
    fn autopilot_without_prior_position_starts_at_target_bearing() {
        let mut state = SimulationState::new();
        state.set_pivot(pivot(60.0));
        state.set_manual_target(GeoPoint::new(0.0, 0.001));
        assert!(state.set_mode(SimulationMode::Autopilot));
        assert!(close(state.current_angle_deg, 90.0));
        let _ = state.advance(TICK);
        assert!(close(state.current_angle_deg, 90.0));
    }

    #[test]
    fn speed_change_affects_next_step() {
        let mut state = SimulationState::new();
        state.set_pivot(pivot(60.0));
        state.set_manual_target(GeoPoint::new(-0.001, 0.0)); // bearing 180
        state.current_angle_deg = 90.0;
        state.mode = SimulationMode::Autopilot;

        let _ = state.advance(TICK);
        assert!(close(state.current_angle_deg, 91.0));
        assert!(state.set_speed(600.0));
        let _ = state.advance(TICK);
        assert!(close(state.current_angle_deg, 101.0));
    }

    #[test]
    fn progress_scales_with_tick_interval() {
        let p = pivot(60.0);
        assert!(close(p.progress_per_tick(TICK), 1.0));
        assert!(close(p.progress_per_tick(Duration::from_millis(500)), 0.5));
        assert!(close(p.progress_per_tick(Duration::from_millis(100)), 0.1));
        assert!(close(p.progress_per_tick(Duration::from_secs(2)), 2.0));
    }

    #[test]
    fn half_second_ticks_keep_degrees_per_minute() {
        let mut state = SimulationState::new();
        state.set_pivot(pivot(60.0));
        state.set_manual_target(GeoPoint::new(-0.001, 0.0)); // bearing 180
        state.current_angle_deg = 90.0;
        state.mode = SimulationMode::Autopilot;

        // 20 half-second ticks are ten seconds: 10 degrees at 60 deg/min.
        for _ in 0..20 {
            let _ = state.advance(Duration::from_millis(500));
        }
        assert!((state.current_angle_deg - 100.0).abs() < 1e-6);
    }

    #[test]
    fn autopilot_without_target_emits_nothing() {
        let mut state = SimulationState::new();
        state.set_pivot(pivot(60.0));
        assert!(state.set_mode(SimulationMode::Autopilot));

        assert_eq!(state.advance(TICK), None);
        assert_eq!(state.current_position, None);
        assert!(close(state.current_angle_deg, 0.0));

        // The first target places the sweep at its bearing, not at north.
        state.set_manual_target(GeoPoint::new(0.0, 0.001));
        assert!(close(state.current_angle_deg, 90.0));
        let event = state.advance(TICK).unwrap_or_else(|| panic!("no event"));
        assert!((event.bearing_from_pivot_deg - 90.0).abs() < 1e-6);
    }

    #[test]
    fn speed_rejected_without_pivot_or_nonpositive() {
        let mut state = SimulationState::new();
        assert!(!state.set_speed(10.0));
        state.set_pivot(pivot(60.0));
        assert!(!state.set_speed(0.0));
        assert!(!state.set_speed(f64::INFINITY));
        assert_eq!(state.pivot.map(|p| p.speed_deg_per_min), Some(60.0));
    }
}
