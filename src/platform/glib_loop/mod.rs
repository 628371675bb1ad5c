mod pipe;

pub use pipe::{PipeWriter, WakeupPipe};

use std::{cell::Cell, mem, os::raw::c_int};

use glib::{
    MainContext,
    ffi::{
        G_IO_IN, GFALSE, GPollFD, GSource, GSourceFunc, GSourceFuncs, GTRUE, gboolean, gpointer,
    },
    translate::ToGlibPtr,
};
use tracing::{debug, error};

use crate::{
    config::PumpConfig,
    error::{Error, Result},
    pump::{DeadlineTimer, ExternalPump, MessageLoopWork, PumpState, Scheduler},
};

#[repr(C)]
struct WorkSource {
    source: GSource,
    pump: *const Inner,
}

struct Inner {
    pump: ExternalPump<DeadlineTimer>,
    pipe: WakeupPipe,
    poll_fd: Cell<GPollFD>,
}

impl Inner {
    /// Returns the timeout we want passed to poll.
    fn handle_prepare(&self) -> c_int {
        // We don't think we have work to do, but make sure not to block longer
        // than the next time we need to run delayed work.
        self.pump.timer().timeout_millis()
    }

    fn handle_check(&self) -> bool {
        if self.poll_fd.get().revents & G_IO_IN as u16 != 0 {
            match self.pipe.read_delays() {
                Ok(delays) => delays
                    .into_iter()
                    .for_each(|delay_ms| self.pump.on_schedule_work(delay_ms)),
                Err(e) => error!("Error reading from the wakeup pipe: {e}"),
            }
        }

        // An expired deadline stays expired until the delayed work runs.
        self.pump.timer().is_due()
    }

    fn handle_dispatch(&self) {
        self.pump.on_timer_timeout();
    }
}

unsafe fn work_source_inner<'a>(source: *mut GSource) -> &'a Inner {
    unsafe { &*(*(source as *mut WorkSource)).pump }
}

unsafe extern "C" fn work_source_prepare(source: *mut GSource, timeout_ms: *mut c_int) -> gboolean {
    unsafe {
        *timeout_ms = work_source_inner(source).handle_prepare();
    }

    // Returning TRUE would turn the timeout into 0 and the poll would never
    // block. Check runs once the poll is finished.
    GFALSE
}

unsafe extern "C" fn work_source_check(source: *mut GSource) -> gboolean {
    match unsafe { work_source_inner(source) }.handle_check() {
        true => GTRUE,
        false => GFALSE,
    }
}

unsafe extern "C" fn work_source_dispatch(
    source: *mut GSource,
    _callback: GSourceFunc,
    _user_data: gpointer,
) -> gboolean {
    unsafe { work_source_inner(source) }.handle_dispatch();

    // Keep the source registered.
    GTRUE
}

/// Pump integrated into a GLib `MainContext` through a custom source.
pub struct GlibPump {
    source: *mut GSource,
    inner: Box<Inner>,
    _funcs: Box<GSourceFuncs>,
}

impl GlibPump {
    /// Attaches to the global default main context.
    pub fn new(engine: impl MessageLoopWork + 'static, config: &PumpConfig) -> Result<Self> {
        Self::with_context(engine, &MainContext::default(), config)
    }

    pub fn with_context(
        engine: impl MessageLoopWork + 'static,
        context: &MainContext,
        config: &PumpConfig,
    ) -> Result<Self> {
        let pipe = WakeupPipe::new().map_err(Error::WakeupPipe)?;
        let scheduler = Scheduler::new(pipe.writer());

        let inner = Box::new(Inner {
            pump: ExternalPump::new(DeadlineTimer::default(), engine, scheduler, config),
            poll_fd: Cell::new(GPollFD {
                fd: pipe.read_fd(),
                events: G_IO_IN as u16,
                revents: 0,
            }),
            pipe,
        });

        let mut funcs = Box::new(GSourceFuncs {
            prepare: Some(work_source_prepare),
            check: Some(work_source_check),
            dispatch: Some(work_source_dispatch),
            finalize: None,
            closure_callback: None,
            closure_marshal: None,
        });

        let source = unsafe {
            let source = glib::ffi::g_source_new(&mut *funcs, mem::size_of::<WorkSource>() as u32);
            (*(source as *mut WorkSource)).pump = &*inner;

            glib::ffi::g_source_add_poll(source, inner.poll_fd.as_ptr());
            glib::ffi::g_source_set_priority(source, config.source_priority);
            // Nested loops run from inside dispatch.
            glib::ffi::g_source_set_can_recurse(source, GTRUE);

            let context: *mut glib::ffi::GMainContext = context.to_glib_none().0;
            if glib::ffi::g_source_attach(source, context) == 0 {
                glib::ffi::g_source_unref(source);
                return Err(Error::AttachSource);
            }

            source
        };

        debug!("Attached message pump source to the main context");

        Ok(Self {
            source,
            inner,
            _funcs: funcs,
        })
    }

    /// Handle for the engine. Any thread may use it.
    pub fn scheduler(&self) -> Scheduler {
        self.inner.pump.scheduler().clone()
    }

    pub fn state(&self) -> PumpState {
        self.inner.pump.state()
    }

    pub fn timer(&self) -> &DeadlineTimer {
        self.inner.pump.timer()
    }
}

impl Drop for GlibPump {
    fn drop(&mut self) {
        unsafe {
            glib::ffi::g_source_destroy(self.source);
            glib::ffi::g_source_unref(self.source);
        }
    }
}
