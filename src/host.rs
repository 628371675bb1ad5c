use std::sync::Arc;

use crate::{config::PumpConfig, pump::Scheduler};

/// Represents a handler for application events.
#[allow(unused_variables)]
pub trait ApplicationHandler: Send + Sync {
    /// Called from any thread when work has been scheduled for the browser
    /// process main (UI) thread.
    ///
    /// `delay_ms` is never larger than one frame. If it is <= 0 the work
    /// should happen reasonably soon, otherwise after the delay, replacing
    /// any previously requested call.
    fn on_schedule_message_pump_work(&self, delay_ms: i32) {}
}

impl ApplicationHandler for () {}

impl<T: ApplicationHandler + ?Sized> ApplicationHandler for Box<T> {
    fn on_schedule_message_pump_work(&self, delay_ms: i32) {
        (**self).on_schedule_message_pump_work(delay_ms)
    }
}

/// Host with the application handler type erased, for FFI wrappers that
/// cannot carry generics.
pub type DynPumpHost = PumpHost<Box<dyn ApplicationHandler>>;

/// Entry point for the engine's schedule requests.
///
/// Forwards every request unchanged to the internal pump, when there is one,
/// and a frame-clamped copy to the application handler.
pub struct PumpHost<T> {
    scheduler: Option<Scheduler>,
    handler: Arc<T>,
    max_timer_delay_ms: i64,
}

impl<T: ApplicationHandler> PumpHost<T> {
    pub fn new(scheduler: Option<Scheduler>, handler: T, config: &PumpConfig) -> Self {
        Self {
            scheduler,
            handler: Arc::new(handler),
            max_timer_delay_ms: config.max_timer_delay_ms(),
        }
    }

    pub fn handler(&self) -> &T {
        &self.handler
    }

    /// May be called on any thread.
    pub fn on_schedule_message_pump_work(&self, delay_ms: i64) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.schedule_message_pump_work(delay_ms);
        }

        let clamped = delay_ms.min(self.max_timer_delay_ms);
        self.handler
            .on_schedule_message_pump_work(i32::try_from(clamped).unwrap_or(i32::MIN));
    }
}

impl<T> Clone for PumpHost<T> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            handler: self.handler.clone(),
            max_timer_delay_ms: self.max_timer_delay_ms,
        }
    }
}
