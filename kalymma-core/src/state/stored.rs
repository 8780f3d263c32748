//! Persisted snapshot codec
//!
//! Packs the calibration and position fields into a single 64-bit word
//! for storage in write-limited non-volatile memory. Layout (canonical,
//! one layout per build):
//!
//! ```text
//! bits 63..49  up course time   (15 bits, unit = 10 ms)
//! bits 48..34  down course time (15 bits, unit = 10 ms)
//! bits 33..24  level + 23       (10 bits)
//! bits 23..17  rotation step up   (7 bits)
//! bits 16..10  rotation step down (7 bits)
//! bits  9..0   tilt + 23        (10 bits)
//! ```
//!
//! Level and tilt are stored with a +23 offset so that raw values below
//! the offset decode to "never set" - a freshly erased word (all zeros)
//! carries no position and fails validation.

/// Full travel range in level units (per-mille of course)
pub const LEVELS: u16 = 1000;

/// Raw-value offset distinguishing "never set" from "set to zero"
pub const LEVEL_OFFSET: u16 = 23;

/// Largest storable course time, in 10 ms units (15-bit field)
pub const MAX_COURSE_UNITS: u16 = (1 << 15) - 1;

/// Largest storable rotation step (7-bit field)
pub const MAX_ROTATION_STEP: u8 = (1 << 7) - 1;

const UP_COURSE_SHIFT: u32 = 49;
const DOWN_COURSE_SHIFT: u32 = 34;
const LEVEL_SHIFT: u32 = 24;
const STEP_UP_SHIFT: u32 = 17;
const STEP_DOWN_SHIFT: u32 = 10;
const TILT_SHIFT: u32 = 0;

const COURSE_WIDTH: u32 = 15;
const POSITION_WIDTH: u32 = 10;
const STEP_WIDTH: u32 = 7;

/// Decoded view of the persisted snapshot word.
///
/// Setters silently reject out-of-range values and leave the field
/// unchanged; callers re-check invariants through the getters or
/// [`StoredState::is_valid`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StoredState {
    word: u64,
}

impl StoredState {
    /// Create an empty snapshot (no usable history)
    pub const fn new() -> Self {
        Self { word: 0 }
    }

    /// Decode a snapshot from a raw word
    pub const fn from_word(word: u64) -> Self {
        Self { word }
    }

    /// Replace the snapshot with a raw word
    pub fn feed(&mut self, word: u64) {
        self.word = word;
    }

    /// The packed 64-bit word
    pub const fn word(&self) -> u64 {
        self.word
    }

    /// Clear all fields back to "no usable history"
    pub fn reset(&mut self) {
        self.word = 0;
    }

    fn bits(&self, shift: u32, width: u32) -> u64 {
        (self.word >> shift) & ((1 << width) - 1)
    }

    fn set_bits(&mut self, shift: u32, width: u32, value: u64) {
        let mask = ((1u64 << width) - 1) << shift;
        self.word = (self.word & !mask) | ((value << shift) & mask);
    }

    fn position(&self, shift: u32) -> Option<u16> {
        let raw = self.bits(shift, POSITION_WIDTH) as u16;
        if raw < LEVEL_OFFSET {
            None
        } else {
            Some(raw - LEVEL_OFFSET)
        }
    }

    fn set_position(&mut self, shift: u32, value: Option<u16>) {
        match value {
            Some(v) if v > LEVELS => {} // out of range, leave unchanged
            Some(v) => self.set_bits(shift, POSITION_WIDTH, (v + LEVEL_OFFSET) as u64),
            None => self.set_bits(shift, POSITION_WIDTH, 0),
        }
    }

    /// Stored level, `None` when never set
    pub fn level(&self) -> Option<u16> {
        self.position(LEVEL_SHIFT)
    }

    /// Store the level; values above [`LEVELS`] are rejected
    pub fn set_level(&mut self, level: Option<u16>) {
        self.set_position(LEVEL_SHIFT, level);
    }

    /// Stored tilt, `None` when never set
    pub fn tilt(&self) -> Option<u16> {
        self.position(TILT_SHIFT)
    }

    /// Store the tilt; values above [`LEVELS`] are rejected
    pub fn set_tilt(&mut self, tilt: Option<u16>) {
        self.set_position(TILT_SHIFT, tilt);
    }

    /// Up course time in 10 ms units, 0 when never set
    pub fn up_course_time(&self) -> u16 {
        self.bits(UP_COURSE_SHIFT, COURSE_WIDTH) as u16
    }

    /// Store the up course time (10 ms units); 0 and overflow are rejected
    pub fn set_up_course_time(&mut self, course_time: u16) {
        if course_time == 0 || course_time > MAX_COURSE_UNITS {
            return;
        }
        self.set_bits(UP_COURSE_SHIFT, COURSE_WIDTH, course_time as u64);
    }

    /// Down course time in 10 ms units, 0 when never set
    pub fn down_course_time(&self) -> u16 {
        self.bits(DOWN_COURSE_SHIFT, COURSE_WIDTH) as u16
    }

    /// Store the down course time (10 ms units); 0 and overflow are rejected
    pub fn set_down_course_time(&mut self, course_time: u16) {
        if course_time == 0 || course_time > MAX_COURSE_UNITS {
            return;
        }
        self.set_bits(DOWN_COURSE_SHIFT, COURSE_WIDTH, course_time as u64);
    }

    /// Tilt units per level unit of upward travel, 0 when never set
    pub fn rotation_step_up(&self) -> u8 {
        self.bits(STEP_UP_SHIFT, STEP_WIDTH) as u8
    }

    /// Store the up rotation step; 0 is rejected
    pub fn set_rotation_step_up(&mut self, rotation_step: u8) {
        if rotation_step == 0 || rotation_step > MAX_ROTATION_STEP {
            return;
        }
        self.set_bits(STEP_UP_SHIFT, STEP_WIDTH, rotation_step as u64);
    }

    /// Tilt units per level unit of downward travel, 0 when never set
    pub fn rotation_step_down(&self) -> u8 {
        self.bits(STEP_DOWN_SHIFT, STEP_WIDTH) as u8
    }

    /// Store the down rotation step; 0 is rejected
    pub fn set_rotation_step_down(&mut self, rotation_step: u8) {
        if rotation_step == 0 || rotation_step > MAX_ROTATION_STEP {
            return;
        }
        self.set_bits(STEP_DOWN_SHIFT, STEP_WIDTH, rotation_step as u64);
    }

    /// Check whether the snapshot carries usable history.
    ///
    /// Both course times and both rotation steps must be nonzero, and
    /// level/tilt, when set, must not exceed [`LEVELS`]. An invalid
    /// snapshot must be treated as "no usable history": position has to
    /// be rediscovered.
    pub fn is_valid(&self) -> bool {
        let up_course_valid = self.up_course_time() > 0;
        let down_course_valid = self.down_course_time() > 0;
        let level_valid = self.level().map_or(true, |l| l <= LEVELS);
        let tilt_valid = self.tilt().map_or(true, |t| t <= LEVELS);
        let step_up_valid = self.rotation_step_up() > 0;
        let step_down_valid = self.rotation_step_down() > 0;

        up_course_valid
            && down_course_valid
            && level_valid
            && tilt_valid
            && step_up_valid
            && step_down_valid
    }
}
