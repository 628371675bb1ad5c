/// Special timer delay placeholder value. Kept 32-bit for Win32 timer API compatibility.
pub const TIMER_DELAY_PLACEHOLDER: i64 = i32::MAX as i64;

pub const DEFAULT_FRAME_RATE: u32 = 60;

/// The maximum number of milliseconds we're willing to wait between calls to the engine work function.
pub const MAX_TIMER_DELAY_MS: i64 = 1000 / DEFAULT_FRAME_RATE as i64;

pub const WORK_DELAY_SIZE: usize = std::mem::size_of::<i64>();

#[cfg(windows)]
pub const MSG_HAVE_WORK: u32 = windows_sys::Win32::UI::WindowsAndMessaging::WM_USER + 1;

#[cfg(windows)]
pub const TIMER_ID: usize = 1;

#[cfg(windows)]
pub const WINDOW_CLASS_NAME: &str = "ChromiumPumpTargetHWND";
