//! Error types shared by the encoder and decoder.
//!
//! This crate is `no_std` and built for the embedded periphery as well as
//! the host, so these are plain enums with a hand-written `Display` rather
//! than a `thiserror`-derived type (the host-side crates use `thiserror`
//! throughout; see `vkvm-host`).

use core::fmt;

/// Failure while encoding a frame: the byte sink rejected a write.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameError {
    /// The sink returned failure; corresponds to the transport-plane
    /// `SEND_ERROR` disconnect reason.
    SendError,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::SendError => f.write_str("byte sink rejected a write while encoding a frame"),
        }
    }
}
