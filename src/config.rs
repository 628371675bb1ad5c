use std::time::Duration;

use crate::constants::{DEFAULT_FRAME_RATE, MAX_TIMER_DELAY_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    /// Upper bound for any armed timer, one frame at the target frame rate.
    pub max_timer_delay: Duration,
    /// Priority of the GLib work source. Lower values run first.
    pub source_priority: i32,
}

impl PumpConfig {
    pub fn with_frame_rate(frame_rate: u32) -> Self {
        let frame_rate = frame_rate.max(1);

        Self {
            max_timer_delay: Duration::from_millis((1000 / frame_rate).max(1) as u64),
            ..Default::default()
        }
    }

    pub fn max_timer_delay_ms(&self) -> i64 {
        self.max_timer_delay.as_millis().max(1) as i64
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            max_timer_delay: Duration::from_millis(MAX_TIMER_DELAY_MS as u64),
            // G_PRIORITY_DEFAULT_IDLE, let other events in the queue go first
            source_priority: 200,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub pump: PumpConfig,
}

impl Config {
    pub fn new(frame_rate: Option<u32>) -> Self {
        let pump = frame_rate
            .map(PumpConfig::with_frame_rate)
            .unwrap_or_default();

        Self { pump }
    }
}

impl From<PumpConfig> for Config {
    fn from(pump: PumpConfig) -> Self {
        Self { pump }
    }
}
