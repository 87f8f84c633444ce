//! Wall-clock playback position for backends that cannot report their own.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::backend::PositionProbe;
use super::types::lock;

#[derive(Debug, Clone, Copy)]
enum ClockState {
    Running { since: Instant, base: Duration },
    Halted(Duration),
}

/// Position = `base + time since start`, frozen while halted and capped at `limit`.
#[derive(Debug)]
pub struct PlayClock {
    state: Mutex<ClockState>,
    limit: Option<Duration>,
}

impl PlayClock {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(ClockState::Halted(Duration::ZERO)),
            limit,
        }
    }

    pub fn run_from(&self, base: Duration) {
        *lock(&self.state) = ClockState::Running {
            since: Instant::now(),
            base: self.cap(base),
        };
    }

    /// Freeze the clock and return where it stopped.
    pub fn halt(&self) -> Duration {
        let mut state = lock(&self.state);
        let now = self.read(*state);
        *state = ClockState::Halted(now);
        now
    }

    /// Move a halted clock, or re-anchor a running one, to `at`.
    pub fn set(&self, at: Duration) {
        let mut state = lock(&self.state);
        let at = self.cap(at);
        *state = match *state {
            ClockState::Running { .. } => ClockState::Running {
                since: Instant::now(),
                base: at,
            },
            ClockState::Halted(_) => ClockState::Halted(at),
        };
    }

    pub fn now(&self) -> Duration {
        self.read(*lock(&self.state))
    }

    pub fn is_running(&self) -> bool {
        matches!(*lock(&self.state), ClockState::Running { .. })
    }

    fn read(&self, state: ClockState) -> Duration {
        match state {
            ClockState::Running { since, base } => self.cap(base + since.elapsed()),
            ClockState::Halted(at) => at,
        }
    }

    fn cap(&self, d: Duration) -> Duration {
        match self.limit {
            Some(limit) => d.min(limit),
            None => d,
        }
    }
}

impl PositionProbe for PlayClock {
    fn position(&self) -> Option<Duration> {
        Some(self.now())
    }
}
