#![cfg_attr(not(test), no_std)]

//! Embedded-side mirror of the host driver (§4.7): a [`dispatch::Dispatcher`]
//! that reads UART frames, dispatches them against a [`state::PeripheryState`],
//! and drives a USB HID composite device through the board-supplied
//! [`HidSink`]. This crate never touches a concrete USB stack or UART driver
//! directly — both are injected by the firmware that links it in, the same
//! separation the teacher draws between its service logic and its `llio`
//! hardware-register layer.

pub mod dispatch;
pub mod hid;
pub mod keyboard_write;
pub mod state;

pub use dispatch::Dispatcher;
pub use state::PeripheryState;

use hid::{AbsoluteMouseReport, KeyboardReport, RelativeMouseReport};

/// The board-supplied USB HID transmit side. Firmware implements this once,
/// over whatever concrete `usb-device` class it assembles the three reports
/// into; this crate only ever calls these three methods.
pub trait HidSink {
    /// Sends the current boot-keyboard report (no report ID).
    fn send_keyboard(&mut self, report: &KeyboardReport) -> bool;
    /// Sends the current relative-mouse report (report ID 1).
    fn send_relative_mouse(&mut self, report: &RelativeMouseReport) -> bool;
    /// Sends the current absolute-mouse report (report ID 2).
    fn send_absolute_mouse(&mut self, report: &AbsoluteMouseReport) -> bool;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::vec::Vec;

    /// An in-memory [`HidSink`] that records every report sent, for
    /// dispatcher tests that don't need a real USB stack.
    #[derive(Default)]
    pub struct RecordingHid {
        pub keyboard: Vec<KeyboardReport>,
        pub relative_mouse: Vec<RelativeMouseReport>,
        pub absolute_mouse: Vec<AbsoluteMouseReport>,
    }

    impl HidSink for RecordingHid {
        fn send_keyboard(&mut self, report: &KeyboardReport) -> bool {
            self.keyboard.push(*report);
            true
        }
        fn send_relative_mouse(&mut self, report: &RelativeMouseReport) -> bool {
            self.relative_mouse.push(*report);
            true
        }
        fn send_absolute_mouse(&mut self, report: &AbsoluteMouseReport) -> bool {
            self.absolute_mouse.push(*report);
            true
        }
    }
}
