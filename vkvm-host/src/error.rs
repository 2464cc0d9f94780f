//! Layered error enums for the host driver: a low-level transport error
//! wrapped by driver-level errors, the same two-tier shape the pack's
//! `thiserror` users apply to their own communication stacks.

use thiserror::Error;

/// Failure while opening the serial link.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),

    #[error("timed out waiting for the port to become available")]
    Timeout,
}

/// Failure returned by a driver method called on a closed or closing link.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver is not open")]
    NotOpen,

    #[error("request queue is full")]
    QueueFull,
}
