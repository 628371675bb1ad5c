use std::{
    cell::{Cell, OnceCell, RefCell},
    cmp::Reverse,
    collections::BinaryHeap,
    rc::Rc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use chromium_pump::{MessageLoopWork, Scheduler};
use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, trace};

const MAX_TASK_DELAY_MS: u64 = 40;

#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub iterations: u64,
    pub tasks_run: u64,
    pub tasks_posted: u64,
    pub nested_loops: u64,
    pub max_lateness: Duration,
}

/// Stand-in for the browser engine: tasks arrive from a worker thread with a
/// delay, run on the loop thread once due, and the engine asks the pump for
/// its next wake-up after every unit of work.
#[derive(Clone)]
pub struct Workload {
    inner: Rc<Inner>,
}

struct Inner {
    scheduler: OnceCell<Scheduler>,
    tasks: Receiver<Instant>,
    sender: Sender<Instant>,
    pending: RefCell<BinaryHeap<Reverse<Instant>>>,
    nested: OnceCell<Box<dyn Fn()>>,
    nested_every: Option<u64>,
    on_closed: OnceCell<Box<dyn Fn()>>,
    close_requested: Cell<bool>,
    closed: Cell<bool>,
    stats: Cell<Stats>,
}

impl Workload {
    pub fn new(nested_every: Option<u32>) -> Self {
        let (sender, tasks) = unbounded::<Instant>();

        Self {
            inner: Rc::new(Inner {
                scheduler: OnceCell::new(),
                tasks,
                sender,
                pending: RefCell::new(BinaryHeap::new()),
                nested: OnceCell::new(),
                nested_every: nested_every.filter(|every| *every > 0).map(u64::from),
                on_closed: OnceCell::new(),
                close_requested: Cell::new(false),
                closed: Cell::new(false),
                stats: Cell::new(Stats::default()),
            }),
        }
    }

    pub fn engine(&self) -> impl MessageLoopWork + 'static {
        let inner = self.inner.clone();
        move || inner.do_work()
    }

    pub fn attach(&self, scheduler: Scheduler) {
        self.inner.scheduler.set(scheduler).ok();
    }

    pub fn scheduler(&self) -> Option<Scheduler> {
        self.inner.scheduler.get().cloned()
    }

    /// Loop iteration spun from inside engine work, like a modal dialog would.
    pub fn set_nested_loop(&self, nested: impl Fn() + 'static) {
        self.inner.nested.set(Box::new(nested)).ok();
    }

    pub fn set_on_closed(&self, on_closed: impl Fn() + 'static) {
        self.inner.on_closed.set(Box::new(on_closed)).ok();
    }

    /// Finishes the queued tasks, then reports the browser as closed.
    pub fn request_close(&self) {
        self.inner.close_requested.set(true);

        if let Some(scheduler) = self.inner.scheduler.get() {
            scheduler.schedule_message_pump_work(0);
        }
    }

    pub fn stats(&self) -> Stats {
        self.inner.stats.get()
    }

    /// Posts tasks from a worker thread at `rate` per second until `until`.
    pub fn spawn_producer(&self, scheduler: Scheduler, rate: u32, until: Instant) -> JoinHandle<u64> {
        let sender = self.inner.sender.clone();
        let interval = Duration::from_secs(1) / rate.max(1);

        thread::spawn(move || {
            let mut posted = 0u64;

            while Instant::now() < until {
                let delay_ms = posted * 7 % MAX_TASK_DELAY_MS;
                if sender
                    .send(Instant::now() + Duration::from_millis(delay_ms))
                    .is_err()
                {
                    break;
                }

                scheduler.schedule_message_pump_work(delay_ms as i64);
                posted += 1;

                thread::sleep(interval);
            }

            posted
        })
    }
}

impl Inner {
    fn update_stats(&self, update: impl FnOnce(&mut Stats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    fn do_work(&self) {
        self.update_stats(|stats| stats.iterations += 1);

        let mut pending = self.pending.borrow_mut();
        let received = self.tasks.try_iter().map(Reverse).collect::<Vec<_>>();
        self.update_stats(|stats| stats.tasks_posted += received.len() as u64);
        pending.extend(received);

        let now = Instant::now();
        while let Some(Reverse(due)) = pending.peek().copied()
            && due <= now
        {
            pending.pop();
            self.update_stats(|stats| {
                stats.tasks_run += 1;
                stats.max_lateness = stats.max_lateness.max(now - due);
            });
        }

        let next = pending.peek().map(|Reverse(due)| *due);
        let is_empty = pending.is_empty();
        drop(pending);

        if let Some(every) = self.nested_every
            && self.stats.get().iterations % every == 0
            && let Some(nested) = self.nested.get()
        {
            trace!("Spinning nested loop");
            self.update_stats(|stats| stats.nested_loops += 1);
            nested();
        }

        if let Some(next) = next
            && let Some(scheduler) = self.scheduler.get()
        {
            let delay = next.saturating_duration_since(Instant::now());
            scheduler.schedule_message_pump_work(delay.as_millis() as i64);
        }

        if is_empty && self.close_requested.get() && !self.closed.get() {
            debug!("Workload drained, closing");
            self.closed.set(true);

            if let Some(on_closed) = self.on_closed.get() {
                on_closed();
            }
        }
    }
}
