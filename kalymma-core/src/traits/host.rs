//! Host integration trait
//!
//! The controller never touches hardware or storage directly. Everything
//! it needs from the outside world goes through [`ShutterHost`]: starting
//! and stopping the relay drive, persisting the snapshot word, and
//! reporting position changes. All calls are synchronous and assumed
//! non-blocking; their failures are not detected or retried here.

/// Relay drive operation requested by the controller.
///
/// Exactly one operation is in effect at any instant: a `Up` or `Down`
/// request supersedes the previous one, `Halt` releases both relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    /// Energize the drive-up relay
    Up,
    /// Energize the drive-down relay
    Down,
    /// Release both relays
    Halt,
}

/// Interface the hosting environment provides to the controller.
///
/// A host is handed to the calls that have observable side effects
/// (`begin`, `tick`, `reset`); the controller does not own or retain it.
/// The notification methods default to no-ops so a host only implements
/// what it cares about.
pub trait ShutterHost {
    /// Start or stop the relay drive.
    ///
    /// Invoked whenever motion starts or stops. The host must apply the
    /// operation immediately; the controller's timing model assumes the
    /// shutter is moving (or not) from this call onward.
    fn operation(&mut self, op: Operation);

    /// Persist the snapshot word to non-volatile storage.
    ///
    /// Invoked whenever a position/calibration-relevant field changes in
    /// a way meant to survive power loss. Write frequency is bounded:
    /// endpoints and stops, not every step of travel.
    fn write_state(&mut self, word: u64);

    /// Read the previously persisted snapshot word.
    ///
    /// Consulted once during `begin` unless a word was explicitly fed
    /// via `restore_state`. A host with no storage can rely on the
    /// default: 0 never decodes to a valid state.
    fn read_state(&mut self) -> u64 {
        0
    }

    /// The inferred level changed, including intermediate steps during travel.
    fn on_level_reached(&mut self, _level: u16) {}

    /// The inferred tilt changed, including intermediate steps during travel.
    fn on_tilt_reached(&mut self, _tilt: u16) {}
}
