/// Switches for the browser process. Software compositing keeps offscreen
/// frames in step with the pump's frame bound.
pub const CMD_SWITCHES: &[&str] = &["disable-gpu", "disable-gpu-compositing"];

pub const WINDOWLESS_FRAME_RATE: u32 = 60;
