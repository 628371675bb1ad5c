use std::{
    cell::Cell,
    time::{Duration, Instant},
};

use super::PumpTimer;

/// Returns a poll timeout for the given deadline: `-1` to block forever,
/// `0` to return right away, or the milliseconds left until `deadline`.
///
/// Rounds up, so 5.5ms left gives 6 and delayed work never runs early.
pub fn interval_millis(deadline: Option<Instant>, now: Instant) -> i32 {
    let Some(deadline) = deadline else {
        return -1;
    };

    let remaining = deadline.saturating_duration_since(now).as_nanos();
    let millis = remaining.div_ceil(1_000_000);

    i32::try_from(millis).unwrap_or(i32::MAX)
}

/// Timer expressed as a recorded absolute deadline.
///
/// No native timer object exists; the owning backend polls with the timeout
/// derived from the deadline and fires once it has been reached.
#[derive(Debug, Default)]
pub struct DeadlineTimer {
    deadline: Cell<Option<Instant>>,
}

impl DeadlineTimer {
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get()
    }

    pub fn timeout_millis(&self) -> i32 {
        interval_millis(self.deadline.get(), Instant::now())
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .get()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// True once an armed deadline has been reached. Stays true until the
    /// timer is killed.
    pub fn is_due(&self) -> bool {
        self.timeout_millis() == 0
    }
}

impl PumpTimer for DeadlineTimer {
    fn set_timer(&self, delay: Duration) {
        debug_assert!(!delay.is_zero());
        self.deadline.set(Some(Instant::now() + delay));
    }

    fn kill_timer(&self) {
        self.deadline.set(None);
    }

    fn is_timer_pending(&self) -> bool {
        self.timeout_millis() > 0
    }
}
