//! Injected time sources.
//!
//! All session time in the core is expressed as milliseconds since an
//! arbitrary origin. Components share one clock through [`SharedClock`] so a
//! test (or the simulated world) can advance time for everyone at once.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Milliseconds since the clock's origin.
pub type Millis = u64;

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Millis;
}

/// Clock handle shared by the orchestrator, governor and handlers.
pub type SharedClock = Rc<dyn Clock>;

/// Wall clock anchored at construction time.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Millis {
        as_millis(self.origin.elapsed())
    }
}

/// Clock that only moves when told to.
///
/// Used by tests and by the simulated world, where `pause` advances time
/// instead of sleeping.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Millis>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get().saturating_add(as_millis(by)));
    }

    pub fn set(&self, now: Millis) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.now.get()
    }
}

/// Convert a `Duration` to whole milliseconds, saturating on overflow.
pub fn as_millis(duration: Duration) -> Millis {
    Millis::try_from(duration.as_millis()).unwrap_or(Millis::MAX)
}
