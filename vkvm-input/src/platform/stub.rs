//! Backend used whenever the target is neither Linux nor Windows (and in
//! unit tests run on any host). Always reports capture unsupported, the
//! same role the teacher's `llio_hosted.rs` plays for hosted-mode builds
//! that have no real hardware underneath them.

use crate::backend::{CaptureBackend, EventSink};
use crate::error::InputError;

#[derive(Debug, Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        StubBackend
    }
}

impl CaptureBackend for StubBackend {
    fn grab(&mut self, _sink: EventSink) -> Result<(), InputError> {
        Err(InputError::Unsupported)
    }

    fn ungrab(&mut self) -> Result<(), InputError> {
        Err(InputError::Unsupported)
    }
}

pub const fn key_to_hid(_os_code: u32) -> u8 {
    vkvm_protocol::hidkeys::NO_EVENT
}

pub const fn button_to_hid(_os_code: u32) -> u8 {
    0x00
}
