use std::{cell::Cell, io, mem, ptr, time::Duration};

use tracing::{debug, error};
use windows_sys::Win32::{
    Foundation::{ERROR_CLASS_ALREADY_EXISTS, GetLastError, HWND, LPARAM, LRESULT, WPARAM},
    System::LibraryLoader::GetModuleHandleW,
    UI::WindowsAndMessaging::{
        CreateWindowExW, DefWindowProcW, DestroyWindow, GWLP_USERDATA, HWND_MESSAGE, KillTimer,
        PostMessageW, RegisterClassExW, SetTimer, WM_TIMER, WNDCLASSEXW, WS_OVERLAPPEDWINDOW,
    },
};

use crate::{
    config::PumpConfig,
    constants::{MSG_HAVE_WORK, TIMER_ID, WINDOW_CLASS_NAME},
    error::{Error, Result},
    pump::{ExternalPump, MessageLoopWork, PumpState, PumpTimer, ScheduleWork, Scheduler},
};

fn wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(Some(0)).collect()
}

#[cfg(target_pointer_width = "64")]
unsafe fn user_data(hwnd: HWND) -> isize {
    unsafe { windows_sys::Win32::UI::WindowsAndMessaging::GetWindowLongPtrW(hwnd, GWLP_USERDATA) }
}

#[cfg(target_pointer_width = "64")]
unsafe fn set_user_data(hwnd: HWND, value: isize) {
    unsafe {
        windows_sys::Win32::UI::WindowsAndMessaging::SetWindowLongPtrW(hwnd, GWLP_USERDATA, value);
    }
}

// The pointer-sized variants are only exported on 64-bit targets.
#[cfg(target_pointer_width = "32")]
unsafe fn user_data(hwnd: HWND) -> isize {
    unsafe { windows_sys::Win32::UI::WindowsAndMessaging::GetWindowLongW(hwnd, GWLP_USERDATA) as isize }
}

#[cfg(target_pointer_width = "32")]
unsafe fn set_user_data(hwnd: HWND, value: isize) {
    unsafe {
        windows_sys::Win32::UI::WindowsAndMessaging::SetWindowLongW(hwnd, GWLP_USERDATA, value as i32);
    }
}

/// Native window timer of the message target.
pub struct WindowTimer {
    hwnd: HWND,
    pending: Cell<bool>,
}

impl PumpTimer for WindowTimer {
    fn set_timer(&self, delay: Duration) {
        self.pending.set(true);
        let elapse = delay.as_millis().min(u32::MAX as u128) as u32;
        unsafe {
            SetTimer(self.hwnd, TIMER_ID, elapse, None);
        }
    }

    fn kill_timer(&self) {
        if self.pending.get() {
            unsafe {
                KillTimer(self.hwnd, TIMER_ID);
            }
            self.pending.set(false);
        }
    }

    fn is_timer_pending(&self) -> bool {
        self.pending.get()
    }
}

/// Posts schedule requests to the message target.
#[derive(Clone, Copy)]
struct MessageTarget(HWND);

// PostMessage is the cross-thread delivery primitive of Win32.
unsafe impl Send for MessageTarget {}
unsafe impl Sync for MessageTarget {}

impl ScheduleWork for MessageTarget {
    fn schedule_message_pump_work(&self, delay_ms: i64) {
        let posted = unsafe { PostMessageW(self.0, MSG_HAVE_WORK, 0, delay_ms as LPARAM) };
        if posted == 0 {
            error!(
                "Could not post to the message target: {}",
                io::Error::last_os_error()
            );
        }
    }
}

unsafe extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if msg == WM_TIMER || msg == MSG_HAVE_WORK {
        let pump = unsafe { user_data(hwnd) } as *const ExternalPump<WindowTimer>;

        if let Some(pump) = unsafe { pump.as_ref() } {
            match msg {
                MSG_HAVE_WORK => pump.on_schedule_work(lparam as i64),
                _ => pump.on_timer_timeout(),
            }
        }
    }

    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

/// Pump integrated into the Win32 message loop through a hidden
/// message-only window owned by the loop thread.
pub struct Win32Pump {
    hwnd: HWND,
    pump: Box<ExternalPump<WindowTimer>>,
}

impl Win32Pump {
    pub fn new(engine: impl MessageLoopWork + 'static, config: &PumpConfig) -> Result<Self> {
        let class_name = wide(WINDOW_CLASS_NAME);

        let hwnd = unsafe {
            let instance = GetModuleHandleW(ptr::null());

            let mut class: WNDCLASSEXW = mem::zeroed();
            class.cbSize = mem::size_of::<WNDCLASSEXW>() as u32;
            class.lpfnWndProc = Some(wnd_proc);
            class.hInstance = instance;
            class.lpszClassName = class_name.as_ptr();

            if RegisterClassExW(&class) == 0 {
                let code = GetLastError();
                if code != ERROR_CLASS_ALREADY_EXISTS {
                    return Err(Error::RegisterClass(io::Error::from_raw_os_error(code as i32)));
                }
            }

            CreateWindowExW(
                0,
                class_name.as_ptr(),
                ptr::null(),
                WS_OVERLAPPEDWINDOW,
                0,
                0,
                0,
                0,
                HWND_MESSAGE,
                ptr::null_mut(),
                instance,
                ptr::null(),
            )
        };

        if hwnd.is_null() {
            return Err(Error::CreateWindow(io::Error::last_os_error()));
        }

        let timer = WindowTimer {
            hwnd,
            pending: Cell::new(false),
        };

        let pump = Box::new(ExternalPump::new(
            timer,
            engine,
            Scheduler::new(MessageTarget(hwnd)),
            config,
        ));

        unsafe {
            set_user_data(hwnd, &*pump as *const _ as isize);
        }

        debug!("Created message pump target window");

        Ok(Self { hwnd, pump })
    }

    pub fn scheduler(&self) -> Scheduler {
        self.pump.scheduler().clone()
    }

    pub fn state(&self) -> PumpState {
        self.pump.state()
    }

    pub fn timer(&self) -> &WindowTimer {
        self.pump.timer()
    }
}

impl Drop for Win32Pump {
    fn drop(&mut self) {
        self.pump.timer().kill_timer();

        unsafe {
            set_user_data(self.hwnd, 0);
            DestroyWindow(self.hwnd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::{LoopDriver, Win32LoopDriver};
    use std::{rc::Rc, thread, time::Instant};
    use windows_sys::Win32::UI::WindowsAndMessaging::IsWindow;

    fn counting_pump() -> (Win32Pump, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let pump = Win32Pump::new(
            move || counter.set(counter.get() + 1),
            &PumpConfig::default(),
        )
        .unwrap();

        (pump, calls)
    }

    fn pump_messages_until(done: impl Fn() -> bool) {
        let driver = Win32LoopDriver;
        let started = Instant::now();

        while !done() {
            assert!(started.elapsed() < Duration::from_secs(2), "message loop stalled");

            if !driver.run_iteration(false) {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn posted_request_runs_work_and_arms_timer() {
        let (pump, calls) = counting_pump();
        assert!(!pump.timer().is_timer_pending());

        pump.scheduler().schedule_message_pump_work(0);
        assert_eq!(calls.get(), 0);

        pump_messages_until(|| calls.get() >= 1);

        assert!(pump.timer().is_timer_pending());
        assert_eq!(pump.state(), PumpState::TimerArmed);
    }

    #[test]
    fn delayed_request_fires_through_wm_timer() {
        let (pump, calls) = counting_pump();

        pump.scheduler().schedule_message_pump_work(5);
        pump_messages_until(|| pump.timer().is_timer_pending());
        assert_eq!(calls.get(), 0);

        pump_messages_until(|| calls.get() >= 1);

        // Re-armed by the placeholder after the work ran.
        assert!(pump.timer().is_timer_pending());
    }

    #[test]
    fn kill_timer_clears_pending_flag() {
        let (pump, _) = counting_pump();

        pump.timer().set_timer(Duration::from_millis(10));
        assert!(pump.timer().is_timer_pending());

        pump.timer().kill_timer();
        assert!(!pump.timer().is_timer_pending());
    }

    #[test]
    fn drop_destroys_message_target() {
        let (pump, calls) = counting_pump();
        let scheduler = pump.scheduler();
        let hwnd = pump.hwnd;

        pump.scheduler().schedule_message_pump_work(0);
        pump_messages_until(|| calls.get() >= 1);
        drop(pump);

        assert_eq!(unsafe { IsWindow(hwnd) }, 0);

        // Posting to a destroyed target is logged, not fatal.
        scheduler.schedule_message_pump_work(0);
        Win32LoopDriver.run_iteration(false);
        assert_eq!(calls.get(), 1);
    }
}
