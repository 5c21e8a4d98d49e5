//! Device time base.
//!
//! The radio owns an absolute clock that is zeroed on a PPS edge at startup.
//! GPIO due times and burst and capture start times are all offsets on that
//! clock, quantised to the TDD tick grid so that both ends of the link agree
//! on when a cycle begins.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;

/// TDD tick length in seconds. Transmit bursts and GPIO sweeps repeat on
/// this grid, and every session starts on a tick boundary.
pub const TICK_SECS: f64 = 0.2;

/// Ticks per second, used for quantisation (`ceil(t * 5) / 5`).
pub const TICKS_PER_SEC: f64 = 1.0 / TICK_SECS;

/// Minimum head start the device needs to arm a timed stream.
/// A quantised start time closer than this to "now" is pushed one tick out.
pub const ARM_MARGIN_SECS: f64 = 0.05;

/// An instant on the device clock, in seconds since the PPS-aligned epoch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct DeviceTime(f64);

impl DeviceTime {
    pub const ZERO: DeviceTime = DeviceTime(0.0);

    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// Round up to the next tick boundary (a boundary exactly at `self`
    /// is kept).
    pub fn ceil_to_tick(self) -> Self {
        Self((self.0 * TICKS_PER_SEC).ceil() / TICKS_PER_SEC)
    }

    /// The later of two instants.
    pub fn latest(self, other: DeviceTime) -> DeviceTime {
        if other > self {
            other
        } else {
            self
        }
    }

    /// Signed distance `self - earlier` in seconds.
    pub fn secs_since(self, earlier: DeviceTime) -> f64 {
        self.0 - earlier.0
    }

    /// Wall-clock duration until `self`, measured from `now`.
    /// Zero if `self` is already in the past.
    pub fn duration_from(self, now: DeviceTime) -> Duration {
        let secs = self.0 - now.0;
        if secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }
}

impl Add<f64> for DeviceTime {
    type Output = DeviceTime;

    fn add(self, secs: f64) -> DeviceTime {
        DeviceTime(self.0 + secs)
    }
}

impl AddAssign<f64> for DeviceTime {
    fn add_assign(&mut self, secs: f64) {
        self.0 += secs;
    }
}

impl Sub<f64> for DeviceTime {
    type Output = DeviceTime;

    fn sub(self, secs: f64) -> DeviceTime {
        DeviceTime(self.0 - secs)
    }
}

impl fmt::Display for DeviceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// Common start time for a new session: the next tick boundary at least
/// [`ARM_MARGIN_SECS`] after `now`.
pub fn next_stream_time(now: DeviceTime) -> DeviceTime {
    let tick = now.ceil_to_tick();
    if tick < now + ARM_MARGIN_SECS {
        tick + TICK_SECS
    } else {
        tick
    }
}
