//! Top-level error type for the CLI binary: wraps the driver's own
//! `DriverError` the same way the pack's debug-probe tooling (e.g.
//! `kflash`'s `OpenError`/`CommunicationError` pair) layers a command-level
//! error over a low-level transport one.

use thiserror::Error;
use vkvm_protocol::catalog::DisconnectReason;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to open {path}: {reason:?}")]
    OpenFailed { path: String, reason: DisconnectReason },

    #[error(transparent)]
    Driver(#[from] vkvm_host::DriverError),

    #[error("timed out waiting for a reply from the periphery")]
    Timeout,

    #[error("link disconnected: {0:?}")]
    Disconnected(DisconnectReason),

    #[error("unrecognized mouse button '{0}' (expected left, right, or middle)")]
    UnknownButton(String),

    #[error("failed to list serial ports: {0}")]
    ListPorts(#[from] serialport::Error),
}
