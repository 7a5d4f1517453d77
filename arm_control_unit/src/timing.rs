//! Rate limiting for the lower-frequency work inside a cycle.

/// Fires at most once per interval.
///
/// The first query always fires, so work gated by a fresh timer runs on
/// the first cycle after setup.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalTimer {
    last_ms: Option<u64>,
}

impl IntervalTimer {
    pub const fn new() -> Self {
        Self { last_ms: None }
    }

    /// Returns `true` and restarts the interval when `interval_ms` has
    /// passed since the last time it fired.
    pub fn is_due(&mut self, interval_ms: u32, now_ms: u64) -> bool {
        let due = match self.last_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= u64::from(interval_ms),
        };
        if due {
            self.last_ms = Some(now_ms);
        }
        due
    }

    /// Forget the last firing time.
    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}
