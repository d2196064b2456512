//! Wall-clock access for everything that timestamps or times out.
//!
//! The race loop, the calibration window and the beta power history all need
//! "now" in seconds. Reading it through [`Clock`] lets the tests drive time by
//! hand instead of sleeping.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the Unix epoch.
pub type Seconds = f64;

/// A source of wall-clock time.
pub trait Clock {
    /// The current time in seconds.
    fn now(&self) -> Seconds;
}

/// The real clock, backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Seconds {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A clock that only moves when told to. Clones share the same time, so a
/// test can keep one handle and give another to the thing under test.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Seconds>>,
}

impl ManualClock {
    /// Instantiates a new [`ManualClock`] reading `start` seconds.
    pub fn new(start: Seconds) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    /// Moves the clock forward by `secs`.
    pub fn advance(&self, secs: Seconds) {
        self.now.set(self.now.get() + secs);
    }

    /// Jumps the clock to `secs`.
    pub fn set(&self, secs: Seconds) {
        self.now.set(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Seconds {
        self.now.get()
    }
}
