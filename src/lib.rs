//! External message pump for hosts that embed Chromium and own the native
//! event loop.
//!
//! The engine asks for work through a [`Scheduler`] from any thread. The pump
//! turns those requests into calls of the engine's work function on the loop
//! thread, never waiting longer than one frame and never re-entering the
//! engine while it is already working.

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod config;
pub mod constants;
mod error;
pub mod host;
pub mod platform;
pub mod pump;
pub mod shutdown;

pub use config::{Config, PumpConfig};
pub use error::{Error, Result};
pub use host::{ApplicationHandler, DynPumpHost, PumpHost};
pub use platform::channel::ChannelPump;
#[cfg(any(unix, windows))]
pub use platform::{NativePump, create};
pub use pump::{ExternalPump, MessageLoopWork, PumpState, PumpTimer, ScheduleWork, Scheduler};
pub use shutdown::{LoopDriver, ShutdownCoordinator};
