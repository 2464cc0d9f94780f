//! Bridges the driver's callback surface (always invoked on its reader
//! thread) to the CLI's single-threaded command loop via a channel, the way
//! a GUI shell would marshal driver events onto its own event loop — except
//! here the "event loop" is just a blocking `recv_timeout`.

use std::sync::mpsc::Sender;

use vkvm_host::VkvmCallbacks;
use vkvm_protocol::catalog::{DisconnectReason, PeripheryResult};

#[derive(Debug, Clone)]
pub enum CliEvent {
    Connected,
    Disconnected(DisconnectReason),
    BrokenFrame,
    UsbState(PeripheryResult, u8),
    KeyboardLeds(PeripheryResult, u8),
    KeyboardWrite(PeripheryResult, u8),
    MouseMoveRel(PeripheryResult, i8, i8),
    MouseButtonPush(PeripheryResult, u8),
}

pub struct CliCallbacks {
    tx: Sender<CliEvent>,
}

impl CliCallbacks {
    pub fn new(tx: Sender<CliEvent>) -> Self {
        CliCallbacks { tx }
    }
}

impl VkvmCallbacks for CliCallbacks {
    fn on_connected(&self) {
        let _ = self.tx.send(CliEvent::Connected);
    }

    fn on_disconnected(&self, reason: DisconnectReason) {
        let _ = self.tx.send(CliEvent::Disconnected(reason));
    }

    fn on_vkvm_broken_frame(&self) {
        let _ = self.tx.send(CliEvent::BrokenFrame);
    }

    fn on_vkvm_usb_state(&self, result: PeripheryResult, state: u8) {
        let _ = self.tx.send(CliEvent::UsbState(result, state));
    }

    fn on_vkvm_keyboard_leds(&self, result: PeripheryResult, leds: u8) {
        let _ = self.tx.send(CliEvent::KeyboardLeds(result, leds));
    }

    fn on_vkvm_keyboard_write(&self, result: PeripheryResult, count: u8, _modifier: u8, _keys: &[u8]) {
        let _ = self.tx.send(CliEvent::KeyboardWrite(result, count));
    }

    fn on_vkvm_mouse_move_rel(&self, result: PeripheryResult, dx: i8, dy: i8) {
        let _ = self.tx.send(CliEvent::MouseMoveRel(result, dx, dy));
    }

    fn on_vkvm_mouse_button_push(&self, result: PeripheryResult, count: u8, _buttons: &[u8]) {
        let _ = self.tx.send(CliEvent::MouseButtonPush(result, count));
    }
}
