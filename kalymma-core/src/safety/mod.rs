//! Relay protection logic

pub mod delay;

pub use delay::{ReversalGuard, SAFETY_DELAY_MS};
