//! Timed shutter motion control

pub mod controller;

pub use controller::ShutterController;
