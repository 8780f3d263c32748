//! Shutter position controller
//!
//! Drives a relay-operated shutter to commanded levels (0..=1000) and
//! slat tilts (0..=1000) with nothing but elapsed time: there is no
//! position sensor. Position is inferred by counting per-level step
//! intervals while a relay is energized, endpoints are self-calibrated
//! by overrunning the detected extreme, and the inferred state survives
//! power loss through a 64-bit snapshot word handed to the host.
//!
//! The controller is a single-threaded polling state machine. The host
//! calls [`ShutterController::tick`] frequently and regularly with a
//! monotonic millisecond timestamp; commands may be issued between
//! ticks from the same execution context. A new command always
//! supersedes a pending one - there is no queue.
//!
//! Tilt has no actuator of its own: slats rotate as a side effect of
//! level travel, so a tilt command is expressed as a small level move
//! once the shutter is idle.

use crate::config::{CourseTiming, DerivedTiming};
use crate::safety::ReversalGuard;
use crate::state::stored::LEVELS;
use crate::state::{Direction, ShutterState, StoredState};
use crate::traits::{Operation, ShutterHost};

/// Timing-based position controller for one shutter.
///
/// Constructed unconfigured (reset mode): configure course and rotation
/// timing, optionally feed a previously persisted word, then call
/// [`begin`](Self::begin). While configured, [`tick`](Self::tick) is the
/// only mutator of runtime state.
#[derive(Debug)]
pub struct ShutterController {
    config: CourseTiming,
    timing: Option<DerivedTiming>,
    stored: StoredState,
    stored_fed: bool,

    state: ShutterState,
    state_time_ms: u32,
    direction: Direction,

    current_level: Option<u16>,
    target_level: Option<u16>,
    current_tilt: Option<u16>,
    target_tilt: Option<u16>,

    guard: ReversalGuard,
    in_reset: bool,
}

impl Default for ShutterController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutterController {
    /// Create an unconfigured controller (reset mode)
    pub fn new() -> Self {
        Self {
            config: CourseTiming::default(),
            timing: None,
            stored: StoredState::new(),
            stored_fed: false,
            state: ShutterState::Idle,
            state_time_ms: 0,
            direction: Direction::Up,
            current_level: None,
            target_level: None,
            current_tilt: None,
            target_tilt: None,
            guard: ReversalGuard::new(),
            in_reset: true,
        }
    }

    /// Set the full-travel durations in ms (rounded down to 10 ms; a
    /// zero down course means "same as up"). Accepted only in reset mode.
    pub fn set_course_time(&mut self, up_ms: u32, down_ms: u32) {
        if self.in_reset {
            self.config.set_course_time(up_ms, down_ms);
        }
    }

    /// Set the rotation periods in ms (zero falls back to the default
    /// period). Accepted only in reset mode.
    pub fn set_rotation_time(&mut self, up_ms: u32, down_ms: u32) {
        if self.in_reset {
            self.config.set_rotation_time(up_ms, down_ms);
        }
    }

    /// Supply rotation steps directly (1..=127; zero reverts to
    /// period-derived steps). Accepted only in reset mode.
    pub fn set_rotation_steps(&mut self, up: u8, down: u8) {
        if self.in_reset {
            self.config.set_rotation_steps(up, down);
        }
    }

    /// Set the endpoint seating overrun as a percentage of the course
    /// time. Accepted only in reset mode.
    pub fn set_calibration_pct(&mut self, percent: u8) {
        if self.in_reset {
            self.config.set_calibration_pct(percent);
        }
    }

    /// Resolved up course time in ms
    pub fn up_course_time(&self) -> u32 {
        match self.timing {
            Some(timing) => timing.up_course_time_ms,
            None => self.config.up_course_time_ms(),
        }
    }

    /// Resolved down course time in ms
    pub fn down_course_time(&self) -> u32 {
        match self.timing {
            Some(timing) => timing.down_course_time_ms,
            None => self.config.down_course_time_ms(),
        }
    }

    /// Configured seating overrun (percent of course time)
    pub fn calibration_pct(&self) -> u8 {
        self.config.calibration_pct()
    }

    /// Feed a previously persisted snapshot word directly, instead of
    /// letting [`begin`](Self::begin) ask the host for one. Accepted
    /// only in reset mode.
    pub fn restore_state(&mut self, word: u64) {
        if self.in_reset {
            self.stored.feed(word);
            self.stored_fed = true;
        }
    }

    /// Leave reset mode.
    ///
    /// Validates the timing configuration, reconciles the persisted
    /// snapshot (read from the host unless one was fed via
    /// [`restore_state`](Self::restore_state)), and persists the
    /// canonical word. Restored level/tilt are adopted only when the
    /// snapshot's course times and rotation steps match the live
    /// configuration; on mismatch the position is invalidated and will
    /// be rediscovered on the next tick.
    ///
    /// With an unusable configuration the controller silently stays in
    /// reset mode - observable via [`is_reset`](Self::is_reset).
    pub fn begin<H: ShutterHost>(&mut self, host: &mut H) {
        if !self.in_reset {
            return;
        }
        let Some(timing) = self.config.derive() else {
            return;
        };

        if !self.stored_fed {
            let word = host.read_state();
            self.stored.feed(word);
            self.stored_fed = true;
        }

        let snapshot_matches = self.stored.is_valid()
            && u32::from(self.stored.up_course_time()) * 10 == timing.up_course_time_ms
            && u32::from(self.stored.down_course_time()) * 10 == timing.down_course_time_ms
            && self.stored.rotation_step_up() == timing.rotation_step_up
            && self.stored.rotation_step_down() == timing.rotation_step_down;

        if snapshot_matches {
            self.current_level = self.stored.level();
            self.current_tilt = self.stored.tilt();
            self.notify_level(host);
            self.notify_tilt(host);
        } else {
            self.current_level = None;
            self.current_tilt = None;
        }

        self.stored.reset();
        self.stored
            .set_up_course_time((timing.up_course_time_ms / 10) as u16);
        self.stored
            .set_down_course_time((timing.down_course_time_ms / 10) as u16);
        self.stored.set_rotation_step_up(timing.rotation_step_up);
        self.stored.set_rotation_step_down(timing.rotation_step_down);
        self.stored.set_level(self.current_level);
        self.stored.set_tilt(self.current_tilt);
        host.write_state(self.stored.word());

        self.timing = Some(timing);
        self.in_reset = false;
    }

    /// Command the shutter to a level in 0..=1000.
    ///
    /// No-op in reset mode, for out-of-range values, and when the
    /// shutter is already at or moving to the requested level. A target
    /// opposing the current travel direction demotes the move to
    /// normalizing: the shutter settles on the next whole level before
    /// the reversal is evaluated.
    pub fn set_level(&mut self, level: u16) {
        if self.in_reset || level > LEVELS {
            return;
        }
        if self.state == ShutterState::Idle && self.current_level == Some(level) {
            return;
        }
        if self.state.is_stepping() && self.target_level == Some(level) {
            return;
        }

        self.target_level = Some(level);
        let direction = self.direction_toward(level);
        if self.state == ShutterState::Targeting && self.direction != direction {
            self.state = ShutterState::Normalizing;
        }
    }

    /// Command the slats to a tilt in 0..=1000.
    ///
    /// Stored as a pending target and converted to a level move the
    /// next time the controller is idle; tilt has no actuator of its
    /// own. No-op in reset mode and for out-of-range values.
    pub fn set_tilt(&mut self, tilt: u16) {
        if self.in_reset || tilt > LEVELS {
            return;
        }
        if self.state == ShutterState::Idle && self.current_tilt == Some(tilt) {
            return;
        }
        self.target_tilt = Some(tilt);
    }

    /// Abandon the pending level target.
    ///
    /// A moving shutter settles on the next whole level (normalizing)
    /// instead of halting mid-step, so the inferred position stays
    /// trustworthy.
    pub fn stop(&mut self) {
        if self.in_reset {
            return;
        }
        self.target_level = None;
        if self.state == ShutterState::Targeting {
            self.state = ShutterState::Normalizing;
        }
    }

    /// Advance the state machine.
    ///
    /// `now_ms` must come from a monotonic millisecond clock; it may
    /// wrap. Call frequently and regularly - all position inference is
    /// derived from elapsed time between ticks.
    pub fn tick<H: ShutterHost>(&mut self, host: &mut H, now_ms: u32) {
        if self.in_reset {
            return;
        }
        let Some(timing) = self.timing else {
            return;
        };

        // Quiet time after a halt: a pending target that would reverse
        // the just-halted travel waits; anything else proceeds.
        if self.guard.expired(now_ms) {
            self.guard.disarm();
        }
        if let Some(target) = self.target_level {
            if self.guard.blocks(self.direction_toward(target)) {
                return;
            }
        }

        let Some(level) = self.current_level else {
            // Position unknown: drive up for a full course plus the
            // seating overrun, which pins the shutter at the top
            // endpoint no matter where it started.
            if self.state != ShutterState::Resetting {
                self.drive(host, Direction::Up);
                self.state = ShutterState::Resetting;
                self.state_time_ms = now_ms;
            } else if now_ms.wrapping_sub(self.state_time_ms)
                >= timing.up_course_time_ms + timing.up_calibration_time_ms
            {
                self.halt(host, now_ms);
                self.state = ShutterState::Idle;
                self.current_level = Some(0);
                self.current_tilt = Some(0);
                self.stored.set_level(self.current_level);
                self.stored.set_tilt(self.current_tilt);
                host.write_state(self.stored.word());
                self.notify_level(host);
                self.notify_tilt(host);
            }
            return;
        };

        if self.state == ShutterState::Idle && self.target_tilt.is_some() {
            self.apply_pending_tilt();
        }

        if self.state == ShutterState::Idle && self.target_level.is_none() {
            return;
        }

        if self.state == ShutterState::Calibrating {
            let calibration_time = match self.direction {
                Direction::Up => timing.up_calibration_time_ms,
                Direction::Down => timing.down_calibration_time_ms,
            };
            if now_ms.wrapping_sub(self.state_time_ms) >= calibration_time {
                self.current_tilt = Some(match self.direction {
                    Direction::Up => 0,
                    Direction::Down => LEVELS,
                });
                self.stored.set_tilt(self.current_tilt);
                self.halt(host, now_ms);
                self.state = ShutterState::Idle;
                self.notify_level(host);
                self.notify_tilt(host);
                host.write_state(self.stored.word());
                self.apply_pending_tilt();
            }
            return;
        }

        if self.state == ShutterState::Idle {
            let Some(target) = self.target_level else {
                return;
            };
            let direction = self.direction_toward(target);
            // A power loss mid-travel must not resurrect a stale
            // position: persist "unknown" before the relay engages.
            self.stored.set_level(None);
            self.stored.set_tilt(None);
            host.write_state(self.stored.word());
            self.drive(host, direction);
            self.state = ShutterState::Targeting;
            self.state_time_ms = now_ms;
            return;
        }

        // Targeting or normalizing: advance one level per step interval.
        let step_time = match self.direction {
            Direction::Up => timing.up_step_time_ms,
            Direction::Down => timing.down_step_time_ms,
        };
        if now_ms.wrapping_sub(self.state_time_ms) < step_time {
            return;
        }

        let level = match self.direction {
            Direction::Up => level.saturating_sub(1),
            Direction::Down => (level + 1).min(LEVELS),
        };
        let tilt_delta = match self.direction {
            Direction::Up => -i32::from(timing.rotation_step_up),
            Direction::Down => i32::from(timing.rotation_step_down),
        };
        let tilt = (i32::from(self.current_tilt.unwrap_or(0)) + tilt_delta)
            .clamp(0, i32::from(LEVELS)) as u16;

        self.current_level = Some(level);
        self.current_tilt = Some(tilt);
        self.stored.set_level(self.current_level);
        self.stored.set_tilt(self.current_tilt);
        self.state_time_ms = now_ms;

        if level == 0 || level == LEVELS {
            // Endpoint detected: keep driving for the seating overrun.
            self.state = ShutterState::Calibrating;
            if self.target_level == Some(level) {
                self.target_level = None;
            }
            return;
        }

        if self.state == ShutterState::Normalizing {
            // The completed step realigned position to a whole level;
            // no direction conflict remains, so settle here.
            self.halt(host, now_ms);
            self.state = ShutterState::Idle;
            self.notify_level(host);
            self.notify_tilt(host);
            if self.target_level.is_none() {
                host.write_state(self.stored.word());
            }
            self.apply_pending_tilt();
            return;
        }

        if self.state == ShutterState::Targeting && self.target_level == Some(level) {
            self.halt(host, now_ms);
            self.state = ShutterState::Idle;
            self.target_level = None;
            self.notify_level(host);
            self.notify_tilt(host);
            host.write_state(self.stored.word());
            self.apply_pending_tilt();
            return;
        }

        // Intermediate level: observers hear about it, storage does not.
        self.notify_level(host);
        self.notify_tilt(host);
    }

    /// Halt the relay, clear the persisted word, and re-enter reset
    /// mode. Position is forgotten and will be rediscovered after the
    /// next [`begin`](Self::begin).
    pub fn reset<H: ShutterHost>(&mut self, host: &mut H, now_ms: u32) {
        self.halt(host, now_ms);
        self.stored.reset();
        host.write_state(self.stored.word());
        self.state = ShutterState::Idle;
        self.target_level = None;
        self.target_tilt = None;
        self.current_level = None;
        self.current_tilt = None;
        self.timing = None;
        self.stored_fed = false;
        self.in_reset = true;
    }

    /// Check if the controller is quiescent (no relay active)
    pub fn is_idle(&self) -> bool {
        self.state == ShutterState::Idle
    }

    /// Check if the controller is in reset mode (unconfigured)
    pub fn is_reset(&self) -> bool {
        self.in_reset
    }

    /// Inferred level, `None` while unknown
    pub fn current_level(&self) -> Option<u16> {
        self.current_level
    }

    /// Inferred tilt, `None` while unknown
    pub fn current_tilt(&self) -> Option<u16> {
        self.current_tilt
    }

    fn direction_toward(&self, target: u16) -> Direction {
        match self.current_level {
            Some(current) if target > current => Direction::Down,
            _ => Direction::Up,
        }
    }

    fn drive<H: ShutterHost>(&mut self, host: &mut H, direction: Direction) {
        self.direction = direction;
        host.operation(match direction {
            Direction::Up => Operation::Up,
            Direction::Down => Operation::Down,
        });
        self.guard.disarm();
    }

    fn halt<H: ShutterHost>(&mut self, host: &mut H, now_ms: u32) {
        host.operation(Operation::Halt);
        self.guard.arm(now_ms, self.direction.opposite());
    }

    fn notify_level<H: ShutterHost>(&self, host: &mut H) {
        if let Some(level) = self.current_level {
            host.on_level_reached(level);
        }
    }

    fn notify_tilt<H: ShutterHost>(&self, host: &mut H) {
        if let Some(tilt) = self.current_tilt {
            host.on_tilt_reached(tilt);
        }
    }

    /// Express the pending tilt target as a level move.
    ///
    /// The rotation step for the implied direction converts the tilt
    /// delta into a level delta; a one-unit overshoot at tilt 0/1000
    /// guarantees the slats reach their hard limit instead of stopping
    /// one step short.
    fn apply_pending_tilt(&mut self) {
        let Some(target_tilt) = self.target_tilt else {
            return;
        };
        let Some(timing) = self.timing else {
            return;
        };
        let (Some(level), Some(tilt)) = (self.current_level, self.current_tilt) else {
            return;
        };

        let direction = if target_tilt > tilt {
            Direction::Down
        } else {
            Direction::Up
        };
        let rotation_step = match direction {
            Direction::Up => timing.rotation_step_up,
            Direction::Down => timing.rotation_step_down,
        };
        let seating = match target_tilt {
            0 => -1i32,
            LEVELS => 1,
            _ => 0,
        };
        let delta = (i32::from(target_tilt) - i32::from(tilt)) / i32::from(rotation_step);
        let goal = (i32::from(level) + delta + seating).clamp(0, i32::from(LEVELS)) as u16;

        self.target_tilt = None;
        self.set_level(goal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Host double that records every outbound call.
    #[derive(Default)]
    struct RecordingHost {
        operations: Vec<Operation>,
        writes: Vec<u64>,
        levels: Vec<u16>,
        tilts: Vec<u16>,
        nvm_word: u64,
    }

    impl ShutterHost for RecordingHost {
        fn operation(&mut self, op: Operation) {
            self.operations.push(op);
        }

        fn write_state(&mut self, word: u64) {
            self.writes.push(word);
        }

        fn read_state(&mut self) -> u64 {
            self.nvm_word
        }

        fn on_level_reached(&mut self, level: u16) {
            self.levels.push(level);
        }

        fn on_tilt_reached(&mut self, tilt: u16) {
            self.tilts.push(tilt);
        }
    }

    const COURSE_MS: u32 = 20_000;
    const STEP_MS: u32 = COURSE_MS / 1000;
    const CALIBRATION_MS: u32 = COURSE_MS / 10;
    const ROTATION_STEP: u8 = 13; // 20000 / 1500
    const SAFETY_WAIT: u32 = 1000;

    fn configured() -> ShutterController {
        let mut shutter = ShutterController::new();
        shutter.set_course_time(COURSE_MS, COURSE_MS);
        shutter.set_rotation_time(1500, 1500);
        shutter
    }

    /// Snapshot word matching `configured()` with a known position.
    fn snapshot(level: Option<u16>, tilt: Option<u16>) -> u64 {
        let mut stored = StoredState::new();
        stored.set_up_course_time((COURSE_MS / 10) as u16);
        stored.set_down_course_time((COURSE_MS / 10) as u16);
        stored.set_rotation_step_up(ROTATION_STEP);
        stored.set_rotation_step_down(ROTATION_STEP);
        stored.set_level(level);
        stored.set_tilt(tilt);
        stored.word()
    }

    /// Controller restored to a known position, plus a fresh host.
    fn at_position(level: u16, tilt: u16) -> (ShutterController, RecordingHost) {
        let mut host = RecordingHost {
            nvm_word: snapshot(Some(level), Some(tilt)),
            ..Default::default()
        };
        let mut shutter = configured();
        shutter.begin(&mut host);
        assert_eq!(shutter.current_level(), Some(level));
        let host = RecordingHost::default();
        (shutter, host)
    }

    fn run(shutter: &mut ShutterController, host: &mut RecordingHost, from_ms: u32, to_ms: u32) {
        let mut now = from_ms;
        while now <= to_ms {
            shutter.tick(host, now);
            now += 10;
        }
    }

    #[test]
    fn test_unconfigured_begin_stays_reset() {
        let mut host = RecordingHost::default();
        let mut shutter = ShutterController::new();
        shutter.begin(&mut host);
        assert!(shutter.is_reset());

        // commands are no-ops in reset mode
        shutter.set_level(500);
        shutter.set_tilt(500);
        shutter.tick(&mut host, 0);
        shutter.tick(&mut host, 1000);
        assert!(host.operations.is_empty());
        assert!(host.writes.is_empty());
    }

    #[test]
    fn test_begin_persists_canonical_word() {
        let mut host = RecordingHost::default();
        let mut shutter = configured();
        shutter.begin(&mut host);
        assert!(!shutter.is_reset());

        let word = *host.writes.last().unwrap();
        let stored = StoredState::from_word(word);
        assert_eq!(u32::from(stored.up_course_time()) * 10, COURSE_MS);
        assert_eq!(u32::from(stored.down_course_time()) * 10, COURSE_MS);
        assert_eq!(stored.rotation_step_up(), ROTATION_STEP);
        assert_eq!(stored.rotation_step_down(), ROTATION_STEP);
        assert_eq!(stored.level(), None);
        assert_eq!(stored.tilt(), None);
    }

    #[test]
    fn test_unknown_position_seeks_top_endpoint() {
        let mut host = RecordingHost::default();
        let mut shutter = configured();
        shutter.begin(&mut host);
        assert_eq!(shutter.current_level(), None);

        shutter.tick(&mut host, 0);
        assert_eq!(host.operations, [Operation::Up]);
        assert!(!shutter.is_idle());

        // full course plus seating overrun
        run(&mut shutter, &mut host, 10, COURSE_MS + CALIBRATION_MS - 10);
        assert_eq!(host.operations, [Operation::Up]);

        shutter.tick(&mut host, COURSE_MS + CALIBRATION_MS);
        assert_eq!(host.operations, [Operation::Up, Operation::Halt]);
        assert!(shutter.is_idle());
        assert_eq!(shutter.current_level(), Some(0));
        assert_eq!(shutter.current_tilt(), Some(0));
        assert_eq!(host.levels, [0]);
        assert_eq!(host.tilts, [0]);

        let stored = StoredState::from_word(*host.writes.last().unwrap());
        assert_eq!(stored.level(), Some(0));
        assert_eq!(stored.tilt(), Some(0));
    }

    #[test]
    fn test_targeting_reaches_level_with_step_notifications() {
        // Scenario: course 20000 ms, rotation period 1500 => step 13.
        // From level 0, set_level(500) drives down and arrives after
        // ~10000 ms with one notification per level unit crossed.
        let (mut shutter, mut host) = at_position(0, 0);

        shutter.set_level(500);
        shutter.tick(&mut host, 0);
        assert_eq!(host.operations, [Operation::Down]);
        // transient "position unknown" snapshot written at motion start
        let transient = StoredState::from_word(host.writes[0]);
        assert_eq!(transient.level(), None);
        assert_eq!(transient.tilt(), None);

        run(&mut shutter, &mut host, 10, 500 * STEP_MS);
        assert!(shutter.is_idle());
        assert_eq!(shutter.current_level(), Some(500));
        assert_eq!(host.operations, [Operation::Down, Operation::Halt]);

        // one notification per level unit, ending at the target
        assert_eq!(host.levels.len(), 500);
        assert_eq!(host.levels[0], 1);
        assert_eq!(*host.levels.last().unwrap(), 500);

        // tilt rode along at 13 units per level, clamped at the limit
        assert_eq!(host.tilts[0], 13);
        assert_eq!(*host.tilts.last().unwrap(), 1000);

        // exactly two writes: transient unknown + final position
        assert_eq!(host.writes.len(), 2);
        let stored = StoredState::from_word(host.writes[1]);
        assert_eq!(stored.level(), Some(500));
        assert_eq!(stored.tilt(), Some(1000));
    }

    #[test]
    fn test_set_level_is_idempotent() {
        let (mut shutter, mut host) = at_position(500, 500);

        shutter.set_level(500);
        run(&mut shutter, &mut host, 0, 5000);
        assert!(host.operations.is_empty());
        assert!(host.writes.is_empty());
    }

    #[test]
    fn test_set_level_rejects_out_of_range() {
        let (mut shutter, mut host) = at_position(500, 500);

        shutter.set_level(1001);
        shutter.set_tilt(1001);
        run(&mut shutter, &mut host, 0, 5000);
        assert!(host.operations.is_empty());
    }

    #[test]
    fn test_safety_delay_defers_reversal() {
        let (mut shutter, mut host) = at_position(0, 0);

        // travel down to 500, halting at t = 10000
        shutter.set_level(500);
        run(&mut shutter, &mut host, 0, 500 * STEP_MS);
        assert_eq!(host.operations, [Operation::Down, Operation::Halt]);

        // reversing into up must wait out the quiet time
        shutter.set_level(400);
        run(&mut shutter, &mut host, 10_010, 10_990);
        assert_eq!(host.operations.len(), 2); // still only Down, Halt

        shutter.tick(&mut host, 11_000);
        assert_eq!(
            host.operations,
            [Operation::Down, Operation::Halt, Operation::Up]
        );
    }

    #[test]
    fn test_safety_delay_allows_same_direction() {
        let (mut shutter, mut host) = at_position(0, 0);

        shutter.set_level(500);
        run(&mut shutter, &mut host, 0, 500 * STEP_MS);
        assert_eq!(host.operations, [Operation::Down, Operation::Halt]);

        // continuing down is not a reversal: starts on the next tick
        shutter.set_level(600);
        shutter.tick(&mut host, 10_010);
        assert_eq!(
            host.operations,
            [Operation::Down, Operation::Halt, Operation::Down]
        );
    }

    #[test]
    fn test_endpoint_triggers_calibration() {
        // Scenario: reaching level 1000 keeps the relay engaged for the
        // seating overrun, then halts with tilt pinned at the extreme.
        let (mut shutter, mut host) = at_position(900, 0);

        shutter.set_level(1000);
        run(&mut shutter, &mut host, 0, 100 * STEP_MS);
        // endpoint reached but still calibrating: no halt yet
        assert_eq!(host.operations, [Operation::Down]);
        assert!(!shutter.is_idle());
        assert_eq!(shutter.current_level(), Some(1000));

        run(
            &mut shutter,
            &mut host,
            100 * STEP_MS + 10,
            100 * STEP_MS + CALIBRATION_MS,
        );
        assert_eq!(host.operations, [Operation::Down, Operation::Halt]);
        assert!(shutter.is_idle());
        assert_eq!(shutter.current_tilt(), Some(1000));

        let stored = StoredState::from_word(*host.writes.last().unwrap());
        assert_eq!(stored.level(), Some(1000));
        assert_eq!(stored.tilt(), Some(1000));
    }

    #[test]
    fn test_stop_settles_on_whole_level() {
        let (mut shutter, mut host) = at_position(0, 0);

        shutter.set_level(500);
        run(&mut shutter, &mut host, 0, 100 * STEP_MS);
        assert_eq!(shutter.current_level(), Some(100));

        shutter.stop();
        // one more step interval to settle, then halt
        run(&mut shutter, &mut host, 100 * STEP_MS + 10, 101 * STEP_MS);
        assert!(shutter.is_idle());
        assert_eq!(shutter.current_level(), Some(101));
        assert_eq!(host.operations, [Operation::Down, Operation::Halt]);

        // settled position is persisted
        let stored = StoredState::from_word(*host.writes.last().unwrap());
        assert_eq!(stored.level(), Some(101));
    }

    #[test]
    fn test_reversal_normalizes_before_new_target() {
        let (mut shutter, mut host) = at_position(100, 0);

        shutter.set_level(300);
        run(&mut shutter, &mut host, 0, 50 * STEP_MS);
        assert_eq!(shutter.current_level(), Some(150));

        // opposite direction: settle first instead of slamming the relay
        shutter.set_level(100);
        run(&mut shutter, &mut host, 50 * STEP_MS + 10, 51 * STEP_MS);
        assert!(shutter.is_idle());
        assert_eq!(shutter.current_level(), Some(151));
        assert_eq!(host.operations, [Operation::Down, Operation::Halt]);
        // target still pending: the settle does not persist
        assert_eq!(host.writes.len(), 1); // only the motion-start transient

        // after the quiet time the reversed move runs to the target
        run(&mut shutter, &mut host, 51 * STEP_MS + 10, 80_000);
        assert!(shutter.is_idle());
        assert_eq!(shutter.current_level(), Some(100));
        assert_eq!(
            host.operations,
            [
                Operation::Down,
                Operation::Halt,
                Operation::Up,
                Operation::Halt
            ]
        );
    }

    #[test]
    fn test_restore_adopts_matching_snapshot() {
        let mut host = RecordingHost {
            nvm_word: snapshot(Some(321), Some(42)),
            ..Default::default()
        };
        let mut shutter = configured();
        shutter.begin(&mut host);

        assert_eq!(shutter.current_level(), Some(321));
        assert_eq!(shutter.current_tilt(), Some(42));
        assert_eq!(host.levels, [321]);
        assert_eq!(host.tilts, [42]);

        // nothing to do: no reset seek
        run(&mut shutter, &mut host, 0, 5000);
        assert!(host.operations.is_empty());
    }

    #[test]
    fn test_restore_state_feeds_word_directly() {
        let mut host = RecordingHost::default();
        let mut shutter = configured();
        shutter.restore_state(snapshot(Some(321), Some(42)));
        shutter.begin(&mut host);
        assert_eq!(shutter.current_level(), Some(321));
    }

    #[test]
    fn test_mismatched_course_time_invalidates_position() {
        let mut host = RecordingHost {
            nvm_word: snapshot(Some(321), Some(42)),
            ..Default::default()
        };
        let mut shutter = ShutterController::new();
        shutter.set_course_time(25_000, 25_000); // differs from snapshot
        shutter.set_rotation_time(1500, 1500);
        shutter.begin(&mut host);

        assert!(!shutter.is_reset());
        assert_eq!(shutter.current_level(), None);
        assert_eq!(shutter.current_tilt(), None);

        // position must be rediscovered
        shutter.tick(&mut host, 0);
        assert_eq!(host.operations, [Operation::Up]);
    }

    #[test]
    fn test_invalid_snapshot_is_discarded() {
        // rotation-step fields left at zero: no usable history
        let mut bad = StoredState::new();
        bad.set_up_course_time((COURSE_MS / 10) as u16);
        bad.set_down_course_time((COURSE_MS / 10) as u16);
        bad.set_level(Some(321));
        bad.set_tilt(Some(42));
        assert!(!bad.is_valid());

        let mut host = RecordingHost {
            nvm_word: bad.word(),
            ..Default::default()
        };
        let mut shutter = configured();
        shutter.begin(&mut host);
        assert_eq!(shutter.current_level(), None);
        assert_eq!(shutter.current_tilt(), None);
    }

    #[test]
    fn test_tilt_converts_to_level_move() {
        let (mut shutter, mut host) = at_position(500, 500);

        // (760 - 500) / 13 = 20 level units down
        shutter.set_tilt(760);
        run(&mut shutter, &mut host, 0, 20 * STEP_MS);
        assert!(shutter.is_idle());
        assert_eq!(shutter.current_level(), Some(520));
        assert_eq!(shutter.current_tilt(), Some(760));
        assert_eq!(*host.tilts.last().unwrap(), 760);
    }

    #[test]
    fn test_tilt_extremes_overshoot_one_level() {
        // tilt 1000: 500/13 = 38 levels plus one seating unit = 39,
        // which carries the tilt past the hard limit where it clamps
        let (mut shutter, mut host) = at_position(500, 500);
        shutter.set_tilt(1000);
        run(&mut shutter, &mut host, 0, 39 * STEP_MS);
        assert!(shutter.is_idle());
        assert_eq!(shutter.current_level(), Some(539));
        assert_eq!(shutter.current_tilt(), Some(1000));

        let (mut shutter, mut host) = at_position(500, 500);
        shutter.set_tilt(0);
        run(&mut shutter, &mut host, 0, 39 * STEP_MS);
        assert!(shutter.is_idle());
        assert_eq!(shutter.current_level(), Some(461));
        assert_eq!(shutter.current_tilt(), Some(0));
    }

    #[test]
    fn test_tilt_waits_for_idle() {
        let (mut shutter, mut host) = at_position(0, 0);

        shutter.set_level(300);
        run(&mut shutter, &mut host, 0, 100 * STEP_MS);
        shutter.set_tilt(0); // queued while still targeting
        run(&mut shutter, &mut host, 100 * STEP_MS + 10, 300 * STEP_MS);
        assert!(shutter.is_idle());
        assert_eq!(shutter.current_level(), Some(300));
        assert_eq!(shutter.current_tilt(), Some(1000)); // clamped during descent

        // pending tilt converts once idle; the implied up move is a
        // reversal, so it starts after the quiet time
        let start = 300 * STEP_MS + 10;
        run(&mut shutter, &mut host, start, start + SAFETY_WAIT + 79 * STEP_MS);
        assert!(shutter.is_idle());
        assert_eq!(shutter.current_tilt(), Some(0));
        // (0 - 1000) / 13 = -76 levels minus one seating unit
        assert_eq!(shutter.current_level(), Some(223));
    }

    #[test]
    fn test_reset_clears_persisted_word() {
        let (mut shutter, mut host) = at_position(500, 500);

        shutter.reset(&mut host, 0);
        assert!(shutter.is_reset());
        assert_eq!(host.operations, [Operation::Halt]);
        assert_eq!(host.writes, [0]);
        assert_eq!(shutter.current_level(), None);

        // commands are no-ops again
        shutter.set_level(100);
        shutter.tick(&mut host, 10);
        assert_eq!(host.operations, [Operation::Halt]);
    }

    #[test]
    fn test_configuration_frozen_outside_reset_mode() {
        let mut host = RecordingHost::default();
        let mut shutter = configured();
        shutter.begin(&mut host);

        shutter.set_course_time(5000, 5000);
        assert_eq!(shutter.up_course_time(), COURSE_MS);

        shutter.set_calibration_pct(50);
        assert_eq!(shutter.calibration_pct(), 10);
    }

    #[test]
    fn test_stop_while_idle_does_nothing() {
        let (mut shutter, mut host) = at_position(500, 500);
        shutter.stop();
        run(&mut shutter, &mut host, 0, 2000);
        assert!(host.operations.is_empty());
        assert!(host.writes.is_empty());
    }
}
