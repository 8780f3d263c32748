//! Host abstraction traits
//!
//! These traits define the interface between the controller logic and
//! the hosting environment (relay outputs, non-volatile storage,
//! position observers).

pub mod host;

pub use host::{Operation, ShutterHost};
