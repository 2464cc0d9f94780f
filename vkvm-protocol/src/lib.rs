#![cfg_attr(not(any(test, feature = "test-util")), no_std)]

//! Wire-level building blocks for the VKVM serial link: an HDLC-style framing
//! codec with CRC-16 integrity protection, and the closed catalog of request,
//! response and interrupt kinds that ride on top of it.
//!
//! This crate is shared verbatim between the host driver and the embedded
//! periphery firmware, so it stays `no_std` and never allocates.

pub mod catalog;
pub mod codec;
pub mod crc;
pub mod error;
pub mod hidkeys;

pub use catalog::{DisconnectReason, PeripheryResult, RequestKind, ResponseKind};
pub use codec::{ByteSink, FrameDecoder, FrameEncoder};
pub use error::FrameError;
