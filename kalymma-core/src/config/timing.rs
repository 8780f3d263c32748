//! Course and rotation timing configuration
//!
//! All position inference derives from three calibrated durations: the
//! full up course, the full down course, and the rotation period (the
//! time a slat takes to sweep its full tilt range). Everything else -
//! per-level step time, endpoint seating overrun, tilt units per level
//! unit - is computed here once, when the controller leaves reset mode.
//!
//! Invalid values degrade to built-in defaults rather than failing; the
//! command boundary has no error channel.

use crate::state::stored::{LEVELS, MAX_COURSE_UNITS, MAX_ROTATION_STEP};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rotation period used when the configured one is unusable (ms)
pub const DEFAULT_ROTATION_TIME_MS: u32 = 1500;

/// Endpoint seating overrun used when the configured ratio is unusable (percent)
pub const DEFAULT_CALIBRATION_PCT: u8 = 10;

/// Largest usable course time: the stored 15-bit field in 10 ms units
pub const MAX_COURSE_TIME_MS: u32 = MAX_COURSE_UNITS as u32 * 10;

/// User-facing timing configuration.
///
/// Course times are kept in milliseconds rounded down to 10 ms so they
/// round-trip exactly through the persisted snapshot word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CourseTiming {
    up_course_time_ms: u32,
    down_course_time_ms: u32,
    rotation_time_up_ms: u32,
    rotation_time_down_ms: u32,
    rotation_step_override: Option<(u8, u8)>,
    calibration_pct: u8,
}

impl Default for CourseTiming {
    fn default() -> Self {
        Self {
            up_course_time_ms: 0,
            down_course_time_ms: 0,
            rotation_time_up_ms: DEFAULT_ROTATION_TIME_MS,
            rotation_time_down_ms: DEFAULT_ROTATION_TIME_MS,
            rotation_step_override: None,
            calibration_pct: DEFAULT_CALIBRATION_PCT,
        }
    }
}

impl CourseTiming {
    /// Set the full-travel durations, rounded down to 10 ms.
    ///
    /// A zero down course means "same as up" and is resolved at
    /// derivation time.
    pub fn set_course_time(&mut self, up_ms: u32, down_ms: u32) {
        self.up_course_time_ms = up_ms / 10 * 10;
        self.down_course_time_ms = down_ms / 10 * 10;
    }

    /// Set the rotation periods; zero falls back to
    /// [`DEFAULT_ROTATION_TIME_MS`] at derivation time.
    pub fn set_rotation_time(&mut self, up_ms: u32, down_ms: u32) {
        self.rotation_time_up_ms = up_ms;
        self.rotation_time_down_ms = down_ms;
        self.rotation_step_override = None;
    }

    /// Supply rotation steps directly instead of deriving them from the
    /// rotation period. Zero or overflowing steps clear the override.
    pub fn set_rotation_steps(&mut self, up: u8, down: u8) {
        if up == 0 || down == 0 || up > MAX_ROTATION_STEP || down > MAX_ROTATION_STEP {
            self.rotation_step_override = None;
        } else {
            self.rotation_step_override = Some((up, down));
        }
    }

    /// Set the endpoint seating overrun as a percentage of the course
    /// time. Zero or values above 100 fall back to
    /// [`DEFAULT_CALIBRATION_PCT`].
    pub fn set_calibration_pct(&mut self, percent: u8) {
        self.calibration_pct = if percent == 0 || percent > 100 {
            DEFAULT_CALIBRATION_PCT
        } else {
            percent
        };
    }

    /// Configured up course time (ms)
    pub fn up_course_time_ms(&self) -> u32 {
        self.up_course_time_ms
    }

    /// Configured down course time (ms); 0 means "same as up"
    pub fn down_course_time_ms(&self) -> u32 {
        self.down_course_time_ms
    }

    /// Configured seating overrun (percent of course time)
    pub fn calibration_pct(&self) -> u8 {
        self.calibration_pct
    }

    /// Validate the configuration and compute the derived timing.
    ///
    /// Returns `None` when the up course time is zero or either course
    /// time overflows the storable range - the controller stays in
    /// reset mode in that case.
    pub fn derive(&self) -> Option<DerivedTiming> {
        let up = self.up_course_time_ms;
        if up == 0 || up > MAX_COURSE_TIME_MS {
            return None;
        }
        let down = if self.down_course_time_ms == 0 {
            up
        } else {
            self.down_course_time_ms
        };
        if down > MAX_COURSE_TIME_MS {
            return None;
        }

        let (rotation_step_up, rotation_step_down) = match self.rotation_step_override {
            Some(steps) => steps,
            None => {
                let rotation_up = if self.rotation_time_up_ms == 0 {
                    DEFAULT_ROTATION_TIME_MS
                } else {
                    self.rotation_time_up_ms
                };
                let rotation_down = if self.rotation_time_down_ms == 0 {
                    DEFAULT_ROTATION_TIME_MS
                } else {
                    self.rotation_time_down_ms
                };
                let mut step_up = up / rotation_up;
                let mut step_down = down / rotation_down;
                let max = u32::from(MAX_ROTATION_STEP);
                if step_up == 0 || step_up > max || step_down == 0 || step_down > max {
                    step_up = up / DEFAULT_ROTATION_TIME_MS;
                    step_down = down / DEFAULT_ROTATION_TIME_MS;
                }
                (
                    step_up.clamp(1, max) as u8,
                    step_down.clamp(1, max) as u8,
                )
            }
        };

        let pct = u32::from(self.calibration_pct);
        Some(DerivedTiming {
            up_course_time_ms: up,
            down_course_time_ms: down,
            up_step_time_ms: up / u32::from(LEVELS),
            down_step_time_ms: down / u32::from(LEVELS),
            up_calibration_time_ms: up * pct / 100,
            down_calibration_time_ms: down * pct / 100,
            rotation_step_up,
            rotation_step_down,
        })
    }
}

/// Timing values the controller actually runs on, computed at `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DerivedTiming {
    /// Resolved up course time (ms)
    pub up_course_time_ms: u32,
    /// Resolved down course time (ms)
    pub down_course_time_ms: u32,
    /// Time per level unit going up (ms)
    pub up_step_time_ms: u32,
    /// Time per level unit going down (ms)
    pub down_step_time_ms: u32,
    /// Seating overrun past the top endpoint (ms)
    pub up_calibration_time_ms: u32,
    /// Seating overrun past the bottom endpoint (ms)
    pub down_calibration_time_ms: u32,
    /// Tilt units per level unit going up
    pub rotation_step_up: u8,
    /// Tilt units per level unit going down
    pub rotation_step_down: u8,
}
