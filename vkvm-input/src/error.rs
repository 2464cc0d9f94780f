//! Errors surfaced by the capture backends. Kept separate from
//! `vkvm_host::DriverError` since a grab/ungrab failure never touches the
//! serial link.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("input capture is not supported on this platform")]
    Unsupported,

    #[error("failed to enumerate input devices: {0}")]
    Enumerate(String),

    #[error("failed to grab input device: {0}")]
    Grab(String),

    #[error("capture is already enabled")]
    AlreadyEnabled,

    #[error("capture is already disabled")]
    AlreadyDisabled,
}
