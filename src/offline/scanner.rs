//! Camera-scanner lifecycle as one explicit state machine.
//!
//! The device UI used to juggle separate starting/stopping/running booleans
//! checked from several call sites; this replaces them with a single guarded
//! transition function. A camera that never reports back leaves the FSM in
//! Starting/Stopping only until the timeout, after which it falls back to
//! Stopped on the next poll.

use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScannerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScannerCommand {
    /// Operator pressed start.
    Start,
    /// Camera reported it is delivering frames.
    CameraReady,
    /// Operator pressed stop.
    Stop,
    /// Camera reported it released the device.
    CameraReleased,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("command {command:?} not valid in state {state:?}")]
pub struct TransitionDenied {
    pub state: ScannerState,
    pub command: ScannerCommand,
}

pub struct ScannerFsm {
    state: ScannerState,
    since: Instant,
    timeout: Duration,
}

impl ScannerFsm {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: ScannerState::Stopped,
            since: Instant::now(),
            timeout,
        }
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    /// The single guarded transition. Anything not listed is denied, never
    /// silently absorbed.
    pub fn apply(&mut self, command: ScannerCommand) -> Result<ScannerState, TransitionDenied> {
        use ScannerCommand::*;
        use ScannerState::*;

        let next = match (self.state, command) {
            (Stopped, Start) => Starting,
            (Starting, CameraReady) => Running,
            (Running, Stop) => Stopping,
            (Stopping, CameraReleased) => Stopped,
            // a stop during startup abandons the camera without waiting
            (Starting, Stop) => Stopping,
            (state, command) => return Err(TransitionDenied { state, command }),
        };

        self.state = next;
        self.since = Instant::now();
        Ok(next)
    }

    /// Timeout fallback: transitional states older than the bound collapse to
    /// Stopped so a wedged camera can never strand the UI.
    pub fn poll(&mut self, now: Instant) -> ScannerState {
        if matches!(self.state, ScannerState::Starting | ScannerState::Stopping)
            && now.duration_since(self.since) > self.timeout
        {
            self.state = ScannerState::Stopped;
            self.since = now;
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle() {
        let mut fsm = ScannerFsm::new(Duration::from_secs(5));
        assert_eq!(fsm.apply(ScannerCommand::Start).unwrap(), ScannerState::Starting);
        assert_eq!(
            fsm.apply(ScannerCommand::CameraReady).unwrap(),
            ScannerState::Running
        );
        assert_eq!(fsm.apply(ScannerCommand::Stop).unwrap(), ScannerState::Stopping);
        assert_eq!(
            fsm.apply(ScannerCommand::CameraReleased).unwrap(),
            ScannerState::Stopped
        );
    }

    #[test]
    fn double_start_is_denied_not_absorbed() {
        let mut fsm = ScannerFsm::new(Duration::from_secs(5));
        fsm.apply(ScannerCommand::Start).unwrap();
        let denied = fsm.apply(ScannerCommand::Start).unwrap_err();
        assert_eq!(denied.state, ScannerState::Starting);
        assert_eq!(fsm.state(), ScannerState::Starting);
    }

    #[test]
    fn wedged_startup_falls_back_to_stopped() {
        let mut fsm = ScannerFsm::new(Duration::from_millis(10));
        fsm.apply(ScannerCommand::Start).unwrap();

        let later = Instant::now() + Duration::from_millis(50);
        assert_eq!(fsm.poll(later), ScannerState::Stopped);
        // and the FSM is usable again
        assert_eq!(fsm.apply(ScannerCommand::Start).unwrap(), ScannerState::Starting);
    }

    #[test]
    fn running_never_times_out() {
        let mut fsm = ScannerFsm::new(Duration::from_millis(10));
        fsm.apply(ScannerCommand::Start).unwrap();
        fsm.apply(ScannerCommand::CameraReady).unwrap();

        let later = Instant::now() + Duration::from_secs(60);
        assert_eq!(fsm.poll(later), ScannerState::Running);
    }
}
