//! Hardware driver implementations for the Kalymma shutter controller
//!
//! The core crate only talks to abstract host handlers; this crate
//! provides the concrete building blocks a host wires those handlers
//! to, starting with an interlocked two-relay output stage over
//! `embedded-hal` pins.

#![no_std]
#![deny(unsafe_code)]

pub mod relay;
