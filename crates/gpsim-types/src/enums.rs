//! Enumeration types for the simulation session.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// How the engine derives the next emitted position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// Emit the latest externally supplied target as-is.
    #[default]
    Manual,
    /// Sweep around the configured pivot toward the target bearing.
    Autopilot,
}

/// Lifecycle of the serial output port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    /// No device open.
    #[default]
    Closed,
    /// A device is open but the engine is not ticking.
    Open,
    /// The engine is ticking and writing sentences.
    Sending,
}

impl PortStatus {
    /// Numeric code exposed by the status endpoint (`0`, `1`, `2`).
    pub const fn code(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::Sending => 2,
        }
    }

    /// Inverse of [`PortStatus::code`].
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Closed),
            1 => Some(Self::Open),
            2 => Some(Self::Sending),
            _ => None,
        }
    }

    /// Upper-case label for display.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::Sending => "SENDING",
        }
    }
}
