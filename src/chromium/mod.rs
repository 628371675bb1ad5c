//! Chromium running on the host's own loop.
//!
//! The pump has to exist before the app, since the browser process handler
//! forwards schedule requests to it from the first callback on:
//!
//! ```no_run
//! use chromium_pump::{
//!     ApplicationHandler, DynPumpHost, PumpHost,
//!     chromium::{self, ChromiumApp, ChromiumEngine},
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = chromium::pump_config();
//! let pump = chromium_pump::create(ChromiumEngine, &config)?;
//!
//! let handler: Box<dyn ApplicationHandler> = Box::new(());
//! let host: DynPumpHost = PumpHost::new(Some(pump.scheduler()), handler, &config);
//! let mut app = ChromiumApp::new(host);
//!
//! let args = cef::args::Args::new();
//! cef::initialize(
//!     Some(args.as_main_args()),
//!     Some(&chromium::settings()),
//!     Some(&mut app),
//!     std::ptr::null_mut(),
//! );
//!
//! // Run the native loop; the pump calls `cef::do_message_loop_work`.
//! # Ok(())
//! # }
//! ```

mod app;
mod config;

pub use app::{ChromiumApp, ChromiumBrowserProcessHandler};
use config::WINDOWLESS_FRAME_RATE;

use crate::{config::PumpConfig, pump::MessageLoopWork};

/// Engine work function backed by `cef::do_message_loop_work`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumEngine;

impl MessageLoopWork for ChromiumEngine {
    fn do_message_loop_work(&self) {
        cef::do_message_loop_work();
    }
}

/// Settings for running Chromium with the host owning the message loop.
pub fn settings() -> cef::Settings {
    cef::Settings {
        external_message_pump: true.into(),
        windowless_rendering_enabled: true.into(),
        no_sandbox: true.into(),
        ..Default::default()
    }
}

/// Pump bound matching the windowless frame rate.
pub fn pump_config() -> PumpConfig {
    PumpConfig::with_frame_rate(WINDOWLESS_FRAME_RATE)
}
