//! Time sources for receive timeouts.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait Clock {
    /// Microseconds elapsed since the previous call.
    fn delta_usecs(&mut self) -> u64;
    /// Blocks the host until `usecs` have passed.
    fn sleep(&mut self, usecs: u64);
}

/// Wall-clock time from [`Instant`].
#[derive(Debug)]
pub struct MonotonicClock {
    last: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn delta_usecs(&mut self) -> u64 {
        let now = Instant::now();
        let delta = now.duration_since(self.last);
        self.last = now;
        delta.as_micros().min(u64::MAX as u128) as u64
    }

    fn sleep(&mut self, usecs: u64) {
        std::thread::sleep(Duration::from_micros(usecs));
    }
}

/// Time that only moves when told to. Clones share the same timeline, so a
/// test can keep one handle and give another to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
    last: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, usecs: u64) {
        self.now.set(self.now.get().saturating_add(usecs));
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }
}

impl Clock for ManualClock {
    fn delta_usecs(&mut self) -> u64 {
        let now = self.now.get();
        let delta = now - self.last;
        self.last = now;
        delta
    }

    fn sleep(&mut self, usecs: u64) {
        self.advance(usecs);
    }
}
