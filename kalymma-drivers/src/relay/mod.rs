//! Interlocked two-relay output stage
//!
//! Shutter motors are driven by two relays, one per winding. Energizing
//! both at once shorts the motor, so this driver enforces a hardware
//! interlock in software: the opposing relay is always released before
//! the demanded one is engaged, and state changes are rate-limited to
//! protect mechanical relay contacts.
//!
//! # Usage
//!
//! The driver is updated by calling `update_with_delta()` periodically
//! (typically every millisecond) so the switch-delay accounting
//! advances. The host's operation handler forwards controller
//! operations to [`RelayPair::apply`].
//!
//! ```ignore
//! let mut relays = RelayPair::new(up_pin, down_pin, RelayPairConfig::mechanical());
//!
//! // In the ShutterHost implementation:
//! fn operation(&mut self, op: Operation) {
//!     let _ = self.relays.apply(op);
//! }
//! ```
//!
//! # Safety
//!
//! Relay-driven motors need careful timing:
//! - Mechanical relays need debounce time (~100 ms minimum between switches)
//! - SSRs can switch faster but still benefit from delay (~10 ms)
//! - The quiet time between opposing directions is the controller's
//!   job (its post-halt safety delay); this driver only rate-limits
//!   contact switching

use embedded_hal::digital::OutputPin;

use kalymma_core::state::Direction;
use kalymma_core::traits::Operation;

/// Relay output stage configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RelayPairConfig {
    /// Minimum delay between relay switches (ms)
    pub min_switch_delay_ms: u32,
    /// Relays are active-high (true) or active-low (false)
    pub active_high: bool,
}

impl Default for RelayPairConfig {
    fn default() -> Self {
        Self {
            min_switch_delay_ms: 100,
            active_high: true,
        }
    }
}

impl RelayPairConfig {
    /// Create config for mechanical relays
    pub fn mechanical() -> Self {
        Self {
            min_switch_delay_ms: 100,
            active_high: true,
        }
    }

    /// Create config for SSRs
    pub fn ssr() -> Self {
        Self {
            min_switch_delay_ms: 10,
            active_high: true,
        }
    }
}

/// Errors that can occur when switching the relays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RelayError<E> {
    /// Relay switched again before the minimum delay elapsed
    SwitchTooFast,
    /// Underlying pin error
    Pin(E),
}

/// Two-relay output stage with software interlock.
///
/// Both pins share one type; up/down relays normally sit on the same
/// port expander or GPIO bank.
pub struct RelayPair<P: OutputPin> {
    up: P,
    down: P,
    config: RelayPairConfig,
    /// Which relay is currently energized
    engaged: Option<Direction>,
    /// Time since last relay switch (ms)
    time_since_switch_ms: u32,
}

impl<P: OutputPin> RelayPair<P> {
    /// Create a new relay pair driver.
    ///
    /// The pins are not touched until the first [`apply`](Self::apply);
    /// apply `Operation::Halt` once at startup to force a known state.
    pub fn new(up: P, down: P, config: RelayPairConfig) -> Self {
        Self {
            up,
            down,
            config,
            engaged: None,
            time_since_switch_ms: u32::MAX, // allow immediate first switch
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &RelayPairConfig {
        &self.config
    }

    /// Which relay is currently energized, if any
    pub fn engaged(&self) -> Option<Direction> {
        self.engaged
    }

    /// Check if enough time has passed since the last relay switch
    pub fn can_switch(&self) -> bool {
        self.time_since_switch_ms >= self.config.min_switch_delay_ms
    }

    /// Advance the switch-delay accounting by `delta_ms`
    pub fn update_with_delta(&mut self, delta_ms: u32) {
        self.time_since_switch_ms = self.time_since_switch_ms.saturating_add(delta_ms);
    }

    fn write_pin(pin: &mut P, engage: bool, active_high: bool) -> Result<(), P::Error> {
        if engage == active_high {
            pin.set_high()
        } else {
            pin.set_low()
        }
    }

    /// Apply a controller operation to the relays.
    ///
    /// The opposing relay is released before the demanded one is
    /// engaged. Engaging is rate-limited by the minimum switch delay;
    /// `Halt` is always honored so the motor can be released at any
    /// time.
    pub fn apply(&mut self, op: Operation) -> Result<(), RelayError<P::Error>> {
        let demanded = match op {
            Operation::Up => Some(Direction::Up),
            Operation::Down => Some(Direction::Down),
            Operation::Halt => None,
        };
        if demanded == self.engaged {
            return Ok(());
        }
        if demanded.is_some() && !self.can_switch() {
            return Err(RelayError::SwitchTooFast);
        }

        let active_high = self.config.active_high;
        Self::write_pin(&mut self.up, false, active_high).map_err(RelayError::Pin)?;
        Self::write_pin(&mut self.down, false, active_high).map_err(RelayError::Pin)?;
        self.engaged = None;

        if let Some(direction) = demanded {
            let pin = match direction {
                Direction::Up => &mut self.up,
                Direction::Down => &mut self.down,
            };
            Self::write_pin(pin, true, active_high).map_err(RelayError::Pin)?;
            self.engaged = Some(direction);
        }

        self.time_since_switch_ms = 0;
        Ok(())
    }
}
