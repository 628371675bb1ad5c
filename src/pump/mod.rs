mod deadline;
mod scheduler;

pub use deadline::{DeadlineTimer, interval_millis};
pub use scheduler::{ScheduleWork, Scheduler};

use std::{cell::Cell, fmt, time::Duration};

use tracing::trace;

use crate::{config::PumpConfig, constants::TIMER_DELAY_PLACEHOLDER};

/// Timers never fire sooner than this, even with a zero frame bound.
const MIN_TIMER_DELAY: Duration = Duration::from_millis(1);

/// A single unit of engine message-loop work.
///
/// Called repeatedly on the loop thread. It may request more work through a
/// [`Scheduler`] as a side effect, and it may spin a nested native loop that
/// re-enters the pump.
pub trait MessageLoopWork {
    fn do_message_loop_work(&self);
}

impl<F: Fn()> MessageLoopWork for F {
    fn do_message_loop_work(&self) {
        self()
    }
}

/// Platform timer primitive the pump is written against.
pub trait PumpTimer {
    /// Arms a one-shot timer. Results in a call to
    /// [`ExternalPump::on_timer_timeout`] once `delay` has elapsed.
    fn set_timer(&self, delay: Duration);
    fn kill_timer(&self);
    fn is_timer_pending(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    TimerArmed,
    Executing,
}

/// Reentrancy-safe scheduling policy shared by every backend.
///
/// Lives on the loop thread only. Requests from other threads go through the
/// [`Scheduler`] and reach [`ExternalPump::on_schedule_work`] after the
/// backend has delivered them to this thread.
pub struct ExternalPump<T> {
    timer: T,
    engine: Box<dyn MessageLoopWork>,
    scheduler: Scheduler,
    max_timer_delay: Duration,
    is_active: Cell<bool>,
    reentrancy_detected: Cell<bool>,
}

impl<T: PumpTimer> ExternalPump<T> {
    pub fn new(
        timer: T,
        engine: impl MessageLoopWork + 'static,
        scheduler: Scheduler,
        config: &PumpConfig,
    ) -> Self {
        Self {
            timer,
            engine: Box::new(engine),
            scheduler,
            max_timer_delay: config.max_timer_delay.max(MIN_TIMER_DELAY),
            is_active: Cell::new(false),
            reentrancy_detected: Cell::new(false),
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn state(&self) -> PumpState {
        if self.is_active.get() {
            PumpState::Executing
        } else if self.timer.is_timer_pending() {
            PumpState::TimerArmed
        } else {
            PumpState::Idle
        }
    }

    pub fn on_schedule_work(&self, delay_ms: i64) {
        if delay_ms == TIMER_DELAY_PLACEHOLDER && self.timer.is_timer_pending() {
            // An in-flight timer already guarantees we come back.
            return;
        }

        self.timer.kill_timer();

        if delay_ms <= 0 {
            self.do_work();
        } else {
            // Never wait longer than one frame.
            let delay = Duration::from_millis(delay_ms as u64).min(self.max_timer_delay);
            self.timer.set_timer(delay);
        }
    }

    pub fn on_timer_timeout(&self) {
        self.timer.kill_timer();
        self.do_work();
    }

    fn do_work(&self) {
        let was_reentrant = self.perform_message_loop_work();
        if was_reentrant {
            trace!("Reentrant message loop work, rescheduling");
            self.scheduler.schedule_message_pump_work(0);
        } else if !self.timer.is_timer_pending() {
            // May be dropped by the placeholder check if the work armed its own timer.
            self.on_schedule_work(TIMER_DELAY_PLACEHOLDER);
        }
    }

    fn perform_message_loop_work(&self) -> bool {
        if self.is_active.get() {
            // Engine callbacks (paint, IPC, nested loops) can land here while the
            // outer call is still running. The outer call replays the work later.
            self.reentrancy_detected.set(true);
            return false;
        }

        self.reentrancy_detected.set(false);

        self.is_active.set(true);
        self.engine.do_message_loop_work();
        self.is_active.set(false);

        self.reentrancy_detected.get()
    }
}

impl<T> fmt::Debug for ExternalPump<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalPump")
            .field("max_timer_delay", &self.max_timer_delay)
            .field("is_active", &self.is_active.get())
            .field("reentrancy_detected", &self.reentrancy_detected.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::{
        cell::OnceCell,
        rc::{Rc, Weak},
        sync::{Arc, Mutex},
        time::Instant,
    };

    #[derive(Default)]
    struct MockTimer {
        armed: Cell<Option<Duration>>,
        set_count: Cell<usize>,
    }

    impl PumpTimer for MockTimer {
        fn set_timer(&self, delay: Duration) {
            self.armed.set(Some(delay));
            self.set_count.set(self.set_count.get() + 1);
        }

        fn kill_timer(&self) {
            self.armed.set(None);
        }

        fn is_timer_pending(&self) -> bool {
            self.armed.get().is_some()
        }
    }

    type Posted = Arc<Mutex<Vec<i64>>>;
    type PumpCell = Rc<OnceCell<Weak<ExternalPump<MockTimer>>>>;

    fn recording_scheduler() -> (Scheduler, Posted) {
        let posted = Posted::default();
        let sink = posted.clone();
        let scheduler = Scheduler::new(move |delay_ms: i64| sink.lock().unwrap().push(delay_ms));
        (scheduler, posted)
    }

    fn counting_pump() -> (ExternalPump<MockTimer>, Rc<Cell<usize>>, Posted) {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let (scheduler, posted) = recording_scheduler();
        let pump = ExternalPump::new(
            MockTimer::default(),
            move || counter.set(counter.get() + 1),
            scheduler,
            &PumpConfig::default(),
        );
        (pump, calls, posted)
    }

    /// Builds a pump whose engine can call back into the pump itself.
    fn self_referencing_pump<F>(work: F) -> (Rc<ExternalPump<MockTimer>>, Posted)
    where
        F: Fn(&ExternalPump<MockTimer>) + 'static,
    {
        let cell: PumpCell = Rc::default();
        let engine_cell = cell.clone();
        let (scheduler, posted) = recording_scheduler();

        let pump = Rc::new(ExternalPump::new(
            MockTimer::default(),
            move || {
                if let Some(pump) = engine_cell.get().and_then(Weak::upgrade) {
                    work(&pump);
                }
            },
            scheduler,
            &PumpConfig::default(),
        ));

        cell.set(Rc::downgrade(&pump)).ok();
        (pump, posted)
    }

    #[test]
    fn immediate_work_runs_synchronously_then_rearms() {
        let (pump, calls, posted) = counting_pump();

        pump.on_schedule_work(0);

        assert_eq!(calls.get(), 1);
        assert_eq!(pump.timer().armed.get(), Some(Duration::from_millis(16)));
        assert_eq!(pump.state(), PumpState::TimerArmed);
        assert!(posted.lock().unwrap().is_empty());
    }

    #[test]
    fn negative_delay_is_immediate() {
        let (pump, calls, _) = counting_pump();

        pump.on_schedule_work(-25);

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn positive_delay_arms_without_running() {
        let (pump, calls, _) = counting_pump();

        pump.on_schedule_work(5);

        assert_eq!(calls.get(), 0);
        assert_eq!(pump.timer().armed.get(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn placeholder_keeps_pending_deadline() {
        let (pump, _, _) = counting_pump();

        pump.on_schedule_work(5);
        pump.on_schedule_work(TIMER_DELAY_PLACEHOLDER);

        assert_eq!(pump.timer().armed.get(), Some(Duration::from_millis(5)));
        assert_eq!(pump.timer().set_count.get(), 1);
    }

    #[test]
    fn placeholder_arms_max_delay_when_idle() {
        let (pump, calls, _) = counting_pump();

        pump.on_schedule_work(TIMER_DELAY_PLACEHOLDER);

        assert_eq!(calls.get(), 0);
        assert_eq!(pump.timer().armed.get(), Some(Duration::from_millis(16)));
    }

    #[test]
    fn long_delay_is_clamped_to_one_frame() {
        let (pump, _, _) = counting_pump();

        pump.on_schedule_work(100);

        assert_eq!(pump.timer().armed.get(), Some(Duration::from_millis(16)));
    }

    #[test]
    fn new_request_supersedes_pending_timer() {
        let (pump, _, _) = counting_pump();

        pump.on_schedule_work(10);
        pump.on_schedule_work(3);

        assert_eq!(pump.timer().armed.get(), Some(Duration::from_millis(3)));
    }

    #[test]
    fn timer_timeout_runs_work_and_rearms() {
        let (pump, calls, _) = counting_pump();

        pump.on_schedule_work(5);
        pump.on_timer_timeout();

        assert_eq!(calls.get(), 1);
        assert_eq!(pump.timer().armed.get(), Some(Duration::from_millis(16)));
        assert_eq!(pump.timer().set_count.get(), 2);
    }

    #[test]
    fn state_is_executing_during_work() {
        let observed = Rc::new(Cell::new(None));
        let sink = observed.clone();
        let (pump, _) = self_referencing_pump(move |pump| sink.set(Some(pump.state())));

        assert_eq!(pump.state(), PumpState::Idle);
        pump.on_schedule_work(0);

        assert_eq!(observed.get(), Some(PumpState::Executing));
        assert_eq!(pump.state(), PumpState::TimerArmed);
    }

    #[test]
    fn nested_schedule_is_deferred() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let (pump, posted) = self_referencing_pump(move |pump| {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                pump.on_schedule_work(0);
            }
        });

        pump.on_schedule_work(0);

        // The nested request never reached the engine.
        assert_eq!(calls.get(), 1);
        assert_eq!(*posted.lock().unwrap(), vec![0]);

        // Replaying the deferred request runs the engine once more.
        pump.on_schedule_work(0);
        assert_eq!(calls.get(), 2);
        assert_eq!(*posted.lock().unwrap(), vec![0]);
        assert_eq!(pump.state(), PumpState::TimerArmed);
    }

    #[test]
    fn nested_timeout_is_deferred() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let (pump, posted) = self_referencing_pump(move |pump| {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                pump.on_timer_timeout();
            }
        });

        pump.on_schedule_work(0);

        assert_eq!(calls.get(), 1);
        assert_eq!(*posted.lock().unwrap(), vec![0]);
    }

    #[test]
    fn work_that_arms_a_timer_is_not_overridden() {
        let (pump, posted) = self_referencing_pump(|pump| pump.on_schedule_work(4));

        pump.on_schedule_work(0);

        assert_eq!(pump.timer().armed.get(), Some(Duration::from_millis(4)));
        assert_eq!(pump.timer().set_count.get(), 1);
        assert!(posted.lock().unwrap().is_empty());
    }

    #[test]
    fn custom_frame_rate_bounds_delay() {
        let (scheduler, _) = recording_scheduler();
        let pump = ExternalPump::new(
            MockTimer::default(),
            || {},
            scheduler,
            &PumpConfig::with_frame_rate(30),
        );

        pump.on_schedule_work(500);

        assert_eq!(pump.timer().armed.get(), Some(Duration::from_millis(33)));
    }

    #[test]
    fn zero_frame_bound_still_arms_a_timer() {
        let (scheduler, _) = recording_scheduler();
        let config = PumpConfig {
            max_timer_delay: Duration::ZERO,
            ..Default::default()
        };
        let pump = ExternalPump::new(DeadlineTimer::default(), || {}, scheduler, &config);

        let start = Instant::now();
        pump.on_schedule_work(5);

        let deadline = pump.timer().deadline().unwrap();
        assert!(deadline >= start + MIN_TIMER_DELAY);
    }

    proptest! {
        #[test]
        fn armed_delay_never_exceeds_one_frame(delay_ms in 1i64..=i64::MAX) {
            let (pump, calls, _) = counting_pump();

            pump.on_schedule_work(delay_ms);

            let expected = Duration::from_millis(delay_ms.min(16) as u64);
            prop_assert_eq!(pump.timer().armed.get(), Some(expected));
            prop_assert_eq!(calls.get(), 0);
        }
    }
}
