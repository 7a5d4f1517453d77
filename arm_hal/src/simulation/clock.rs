//! Simulated monotonic clock.

use std::cell::Cell;
use std::rc::Rc;

use arm_common::hal::Clock;

/// Default time advanced by one `relax()` call [µs].
pub const DEFAULT_RELAX_STEP_US: u64 = 50;

/// Shared simulated time.
///
/// Time only moves when a test advances it, when the controller relaxes
/// inside a cooperative wait, or when a simulated bus transaction runs.
#[derive(Debug, Clone)]
pub struct SimClock {
    now_us: Rc<Cell<u64>>,
    relax_step_us: u64,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            now_us: Rc::new(Cell::new(0)),
            relax_step_us: DEFAULT_RELAX_STEP_US,
        }
    }

    /// Clock whose `relax()` advances by `step_us`.
    pub fn with_relax_step(step_us: u64) -> Self {
        Self {
            relax_step_us: step_us.max(1),
            ..Self::new()
        }
    }

    pub fn advance_us(&self, us: u64) {
        self.now_us.set(self.now_us.get().saturating_add(us));
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance_us(ms.saturating_mul(1000));
    }

    /// Jump to an absolute time. Earlier values are ignored.
    pub fn set_us(&self, us: u64) {
        if us > self.now_us.get() {
            self.now_us.set(us);
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        self.now_us.get()
    }

    fn relax(&mut self) {
        self.advance_us(self.relax_step_us);
    }
}
