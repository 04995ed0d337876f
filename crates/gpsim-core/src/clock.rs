//! Time-of-day sources for sentence timestamps.
//!
//! The engine stamps every sentence with the UTC time of day. Tests
//! substitute [`FixedClock`] so encoded output is reproducible.

use chrono::{NaiveTime, Utc};

/// Supplies the UTC time of day used in the GGA time field.
pub trait TimeSource: Send + Sync {
    /// Current UTC time of day.
    fn now(&self) -> NaiveTime;
}

/// Wall-clock UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> NaiveTime {
        Utc::now().time()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveTime);

impl FixedClock {
    /// Clock frozen at `h:m:s`, or midnight if the components are invalid.
    pub fn at(hour: u32, minute: u32, second: u32) -> Self {
        Self(NaiveTime::from_hms_opt(hour, minute, second).unwrap_or(NaiveTime::MIN))
    }
}

impl TimeSource for FixedClock {
    fn now(&self) -> NaiveTime {
        self.0
    }
}
