use std::{fmt, sync::Arc};

/// Cross-thread delivery of schedule requests to the loop thread.
///
/// Implementations must not touch pump state; they only hand the delay over
/// to the thread that owns the pump (pipe write, posted message, channel).
pub trait ScheduleWork: Send + Sync {
    fn schedule_message_pump_work(&self, delay_ms: i64);
}

impl<F> ScheduleWork for F
where
    F: Fn(i64) + Send + Sync,
{
    fn schedule_message_pump_work(&self, delay_ms: i64) {
        self(delay_ms)
    }
}

/// Handle used by the engine to request work, callable from any thread.
#[derive(Clone)]
pub struct Scheduler(Arc<dyn ScheduleWork>);

impl Scheduler {
    pub fn new(delivery: impl ScheduleWork + 'static) -> Self {
        Self(Arc::new(delivery))
    }

    pub fn schedule_message_pump_work(&self, delay_ms: i64) {
        self.0.schedule_message_pump_work(delay_ms);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}
