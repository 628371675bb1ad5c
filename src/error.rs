use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Error type.
///
/// Every variant is a startup failure: without a working native loop
/// integration the pump cannot run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Failed to create the wakeup pipe.
    #[error("failed to create the wakeup pipe: {0}")]
    WakeupPipe(#[source] io::Error),
    /// Failed to attach the work source to the main context.
    #[error("failed to attach the work source to the main context")]
    AttachSource,
    /// Failed to register the window class of the message target.
    #[error("failed to register the message window class: {0}")]
    RegisterClass(#[source] io::Error),
    /// Failed to create the hidden message window.
    #[error("failed to create the message window: {0}")]
    CreateWindow(#[source] io::Error),
}
