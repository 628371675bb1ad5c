use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use tracing::{error, trace};

use crate::{
    config::PumpConfig,
    pump::{DeadlineTimer, ExternalPump, MessageLoopWork, PumpState, Scheduler},
};

/// Pump for loops owned by the embedder (winit, custom poll loops).
///
/// Requests travel over a channel and `waker` nudges the host loop, for
/// example through `EventLoopProxy::send_event`. The host then calls
/// [`ChannelPump::process_pending`], waits for [`ChannelPump::next_timeout`]
/// and finishes with [`ChannelPump::dispatch_due`].
pub struct ChannelPump {
    pump: ExternalPump<DeadlineTimer>,
    receiver: Receiver<i64>,
}

impl ChannelPump {
    pub fn new<W>(engine: impl MessageLoopWork + 'static, waker: W, config: &PumpConfig) -> Self
    where
        W: Fn() + Send + Sync + 'static,
    {
        let (sender, receiver) = unbounded::<i64>();

        let scheduler = Scheduler::new(move |delay_ms: i64| match sender.send(delay_ms) {
            Ok(()) => waker(),
            Err(e) => error!("Failed to schedule message pump work: {e}"),
        });

        Self {
            pump: ExternalPump::new(DeadlineTimer::default(), engine, scheduler, config),
            receiver,
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        self.pump.scheduler().clone()
    }

    pub fn state(&self) -> PumpState {
        self.pump.state()
    }

    pub fn timer(&self) -> &DeadlineTimer {
        self.pump.timer()
    }

    /// Forwards queued requests in the order they were sent. Requests queued
    /// while draining wait for the next call.
    pub fn process_pending(&self) -> usize {
        let pending = self.receiver.len();

        self.receiver
            .try_iter()
            .take(pending)
            .for_each(|delay_ms| self.pump.on_schedule_work(delay_ms));

        pending
    }

    /// Time left until the armed timer fires, `None` when nothing is armed.
    pub fn next_timeout(&self) -> Option<Duration> {
        self.pump.timer().remaining()
    }

    /// Fires the timer if its deadline has been reached.
    pub fn dispatch_due(&self) -> bool {
        if !self.pump.timer().is_due() {
            return false;
        }

        self.pump.on_timer_timeout();
        true
    }

    /// One iteration of a self-driven loop: waits for a request or the armed
    /// deadline, bounded by `max_wait`, then handles whatever is ready.
    /// Returns whether anything was handled.
    pub fn run_iteration(&self, max_wait: Option<Duration>) -> bool {
        let wait = match (self.next_timeout(), max_wait) {
            (Some(timeout), Some(max_wait)) => Some(timeout.min(max_wait)),
            (timeout, max_wait) => timeout.or(max_wait),
        };

        let received = match wait {
            Some(wait) => self.receiver.recv_timeout(wait),
            None => self
                .receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };

        let handled = match received {
            Ok(delay_ms) => {
                self.pump.on_schedule_work(delay_ms);
                self.process_pending();
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                trace!("Message pump wait timed out");
                false
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!("Message pump channel disconnected");
                false
            }
        };

        self.dispatch_due() || handled
    }
}
