pub mod channel;
#[cfg(unix)]
pub mod glib_loop;
#[cfg(windows)]
pub mod win32;

use crate::{config::PumpConfig, error::Result, pump::MessageLoopWork};

#[cfg(unix)]
pub type NativePump = glib_loop::GlibPump;
#[cfg(windows)]
pub type NativePump = win32::Win32Pump;

/// Creates the pump for the platform's native loop.
#[cfg(any(unix, windows))]
pub fn create(engine: impl MessageLoopWork + 'static, config: &PumpConfig) -> Result<NativePump> {
    NativePump::new(engine, config)
}
