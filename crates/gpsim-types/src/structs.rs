//! Value structs shared by the engine, the control API, and the map UI.
//!
//! Coordinates travel over the wire as `[lat, lon]` arrays, which is the
//! shape the browser map widgets produce and consume.

use core::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::SimulationMode;

// ---------------------------------------------------------------------------
// GeoPoint
// ---------------------------------------------------------------------------

/// A latitude/longitude pair in decimal degrees.
///
/// Serialized as a two-element array `[latitude, longitude]`.
/// Deserialization rejects values outside `[-90, 90]` / `[-180, 180]`
/// and non-finite numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a point without range checks.
    ///
    /// Use [`GeoPoint::checked`] for values that come from outside the
    /// process.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Create a point, rejecting out-of-range or non-finite coordinates.
    pub fn checked(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self::new(latitude, longitude))
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.6}, {:.6}]", self.latitude, self.longitude)
    }
}

impl TryFrom<[f64; 2]> for GeoPoint {
    type Error = CoordinateError;

    fn try_from([latitude, longitude]: [f64; 2]) -> Result<Self, Self::Error> {
        Self::checked(latitude, longitude)
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(point: GeoPoint) -> Self {
        [point.latitude, point.longitude]
    }
}

/// A coordinate outside its valid range.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    /// Latitude not finite or outside `[-90, 90]`.
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),
    /// Longitude not finite or outside `[-180, 180]`.
    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),
}

// ---------------------------------------------------------------------------
// PositionEvent
// ---------------------------------------------------------------------------

/// Position update pushed to every connected viewer once per tick.
///
/// Wire shape: `{ "servPos": [lat, lon], "angle": bearing }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PositionEvent {
    /// The position that was just written to the serial device.
    #[serde(rename = "servPos")]
    #[ts(type = "[number, number]")]
    pub position: GeoPoint,
    /// Bearing of `position` as seen from the pivot center, or 0 without
    /// a pivot.
    #[serde(rename = "angle")]
    pub bearing_from_pivot_deg: f64,
}

impl PositionEvent {
    /// Event name used on the push channel.
    pub const EVENT_NAME: &'static str = "gpsData";
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// On-demand view of the session, served by `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Numeric port status code (see [`crate::PortStatus::code`]).
    pub status: u8,
    /// Whether the engine is currently in autopilot.
    pub autopilot: bool,
    /// Current simulation mode.
    pub mode: SimulationMode,
    /// Latest externally supplied target.
    #[ts(type = "[number, number] | null")]
    pub coords: Option<GeoPoint>,
    /// Pivot center, when a pivot is configured.
    #[ts(type = "[number, number] | null")]
    pub pivot_center: Option<GeoPoint>,
    /// Pivot radius in meters, when a pivot is configured.
    pub pivot_radius: Option<f64>,
    /// Angular speed in degrees per minute.
    pub speed: f64,
    /// Last emitted position.
    #[ts(type = "[number, number] | null")]
    pub position: Option<GeoPoint>,
    /// Progress angle around the pivot in degrees.
    pub current_angle: f64,
}
