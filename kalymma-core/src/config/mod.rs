//! Configuration types
//!
//! Course, rotation, and calibration timing with the validation rules
//! applied when the controller leaves reset mode.

pub mod timing;

pub use timing::{
    CourseTiming, DerivedTiming, DEFAULT_CALIBRATION_PCT, DEFAULT_ROTATION_TIME_MS,
    MAX_COURSE_TIME_MS,
};
