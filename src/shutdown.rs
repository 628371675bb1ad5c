use std::cell::Cell;

use tracing::debug;

/// One iteration of the native loop.
pub trait LoopDriver {
    /// Dispatches pending events, blocking for one if `may_block` is set.
    /// Returns whether anything was dispatched.
    fn run_iteration(&self, may_block: bool) -> bool;
}

impl<F: Fn(bool) -> bool> LoopDriver for F {
    fn run_iteration(&self, may_block: bool) -> bool {
        self(may_block)
    }
}

#[cfg(unix)]
pub struct GlibLoopDriver(pub glib::MainContext);

#[cfg(unix)]
impl Default for GlibLoopDriver {
    fn default() -> Self {
        Self(glib::MainContext::default())
    }
}

#[cfg(unix)]
impl LoopDriver for GlibLoopDriver {
    fn run_iteration(&self, may_block: bool) -> bool {
        self.0.iteration(may_block)
    }
}

#[cfg(windows)]
#[derive(Default)]
pub struct Win32LoopDriver;

#[cfg(windows)]
impl LoopDriver for Win32LoopDriver {
    fn run_iteration(&self, may_block: bool) -> bool {
        use windows_sys::Win32::UI::WindowsAndMessaging::{
            DispatchMessageW, GetMessageW, MSG, PM_REMOVE, PeekMessageW, TranslateMessage,
        };

        unsafe {
            let mut msg: MSG = std::mem::zeroed();
            let received = match may_block {
                true => GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) > 0,
                false => PeekMessageW(&mut msg, std::ptr::null_mut(), 0, 0, PM_REMOVE) != 0,
            };

            if received {
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }

            received
        }
    }
}

/// Keeps the native loop alive while browsers finish closing.
///
/// Create it together with the pump at host startup and call
/// [`ShutdownCoordinator::shutdown`] before the engine is torn down. Browser
/// close callbacks keep running through the driver until the last one is gone.
pub struct ShutdownCoordinator<D> {
    driver: D,
    alive_browsers: Cell<u32>,
    shutting_down: Cell<bool>,
    should_quit: Cell<bool>,
}

impl<D: LoopDriver> ShutdownCoordinator<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            alive_browsers: Cell::new(0),
            shutting_down: Cell::new(false),
            should_quit: Cell::new(false),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn alive_browsers(&self) -> u32 {
        self.alive_browsers.get()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.get()
    }

    pub fn browser_created(&self) {
        self.alive_browsers.set(self.alive_browsers.get() + 1);
    }

    pub fn browser_destroyed(&self) {
        self.alive_browsers
            .set(self.alive_browsers.get().saturating_sub(1));

        if self.alive_browsers.get() == 0 && self.shutting_down.get() {
            self.should_quit.set(true);
        }
    }

    /// Returns once every browser has been destroyed.
    pub fn shutdown(&self) {
        if self.alive_browsers.get() == 0 {
            return;
        }

        debug!(
            "Waiting for {} browsers before shutdown",
            self.alive_browsers.get()
        );

        self.shutting_down.set(true);
        self.run();
    }

    fn run(&self) {
        let mut more_work_is_plausible = true;

        loop {
            more_work_is_plausible = self.driver.run_iteration(!more_work_is_plausible);

            if self.should_quit.get() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        cell::{OnceCell, RefCell},
        rc::{Rc, Weak},
    };

    type Driver = Box<dyn Fn(bool) -> bool>;

    #[test]
    fn shutdown_without_browsers_returns_immediately() {
        let iterations = Rc::new(Cell::new(0));
        let counter = iterations.clone();
        let coordinator = ShutdownCoordinator::new(move |_: bool| {
            counter.set(counter.get() + 1);
            false
        });

        coordinator.shutdown();

        assert_eq!(iterations.get(), 0);
        assert!(!coordinator.is_shutting_down());
    }

    #[test]
    fn destroyed_count_saturates() {
        let coordinator = ShutdownCoordinator::new(|_: bool| false);

        coordinator.browser_created();
        coordinator.browser_destroyed();
        coordinator.browser_destroyed();

        assert_eq!(coordinator.alive_browsers(), 0);
    }

    #[test]
    fn shutdown_runs_loop_until_last_browser_is_gone() {
        let cell: Rc<OnceCell<Weak<ShutdownCoordinator<Driver>>>> = Rc::default();
        let flags = Rc::new(RefCell::new(Vec::new()));

        let driver_cell = cell.clone();
        let driver_flags = flags.clone();
        let driver: Driver = Box::new(move |may_block: bool| {
            driver_flags.borrow_mut().push(may_block);
            let iteration = driver_flags.borrow().len();

            // Browsers close on every second iteration.
            if iteration % 2 == 0
                && let Some(coordinator) = driver_cell.get().and_then(Weak::upgrade)
            {
                coordinator.browser_destroyed();
                return true;
            }

            false
        });

        let coordinator = Rc::new(ShutdownCoordinator::new(driver));
        cell.set(Rc::downgrade(&coordinator)).ok();

        coordinator.browser_created();
        coordinator.browser_created();
        coordinator.shutdown();

        assert_eq!(coordinator.alive_browsers(), 0);
        // Only block once the previous iteration found nothing to do.
        assert_eq!(*flags.borrow(), vec![false, true, false, true]);
    }
}
