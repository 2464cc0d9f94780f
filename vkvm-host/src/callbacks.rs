//! The driver's callback surface. One object, registered once at `open()`,
//! receives every lifecycle event, interrupt, and typed per-request result;
//! there is no per-call callback parameter anywhere else in the API (see
//! §6 of the expanded spec). The driver's response-dispatch table (in
//! `driver.rs`) is what maps a `RequestKind` to the matching method here —
//! this trait itself stays a flat list of named events, not a hierarchy.

use vkvm_protocol::catalog::{DisconnectReason, PeripheryResult};

/// Which keyboard/mouse action triggered a remap callback.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RemapAction {
    Down,
    Up,
    Push,
}

/// Implemented by whatever owns a [`crate::driver::VkvmDriver`]. All methods
/// run on the driver's reader thread; none may block, and none may call
/// back into the driver synchronously other than through an async path
/// (see the "cyclic call" design note this crate follows).
#[allow(unused_variables)]
pub trait VkvmCallbacks: Send + Sync {
    /// Fired once per `open()` when `GET_PROTOCOL_VERSION` succeeds and
    /// matches. Delivered before any other request's callback.
    fn on_connected(&self) {}

    /// Fired exactly once per open/close cycle, after all driver tasks have
    /// been joined.
    fn on_disconnected(&self, reason: DisconnectReason) {}

    /// A frame failed its CRC, or was too short to parse. The connection
    /// stays up and the head of the queue is untouched.
    fn on_vkvm_broken_frame(&self) {}

    /// `GET_USB_STATE` response, or an unsolicited `I_USB_STATE_UPDATE`.
    fn on_vkvm_usb_state(&self, result: PeripheryResult, state: u8) {}

    /// `GET_KEYBOARD_LEDS` response, or an unsolicited `I_LED_UPDATE`.
    fn on_vkvm_keyboard_leds(&self, result: PeripheryResult, leds: u8) {}

    /// `SET_KEYBOARD_DOWN` response: `accepted` is the LSB-first bitmap of
    /// which of `keys` (the echoed request) were accepted.
    fn on_vkvm_keyboard_down(&self, result: PeripheryResult, accepted: u8, keys: &[u8]) {}

    /// `SET_KEYBOARD_UP` response, same shape as `on_vkvm_keyboard_down`.
    fn on_vkvm_keyboard_up(&self, result: PeripheryResult, accepted: u8, keys: &[u8]) {}

    /// `SET_KEYBOARD_ALL_UP` response.
    fn on_vkvm_keyboard_all_up(&self, result: PeripheryResult) {}

    /// `SET_KEYBOARD_PUSH` response: `count` keys out of the echoed `keys`
    /// were pushed (pressed then released).
    fn on_vkvm_keyboard_push(&self, result: PeripheryResult, count: u8, keys: &[u8]) {}

    /// `SET_KEYBOARD_WRITE` response: `count` keycodes out of the echoed
    /// `keys` were written, with `modifier` the echoed modifier byte.
    fn on_vkvm_keyboard_write(&self, result: PeripheryResult, count: u8, modifier: u8, keys: &[u8]) {}

    /// `SET_MOUSE_BUTTON_DOWN` response; `buttons` is the echoed request.
    fn on_vkvm_mouse_button_down(&self, result: PeripheryResult, buttons: &[u8]) {}

    /// `SET_MOUSE_BUTTON_UP` response.
    fn on_vkvm_mouse_button_up(&self, result: PeripheryResult, buttons: &[u8]) {}

    /// `SET_MOUSE_BUTTON_ALL_UP` response.
    fn on_vkvm_mouse_button_all_up(&self, result: PeripheryResult) {}

    /// `SET_MOUSE_BUTTON_PUSH` response: `count` of the echoed `buttons`
    /// were pushed.
    fn on_vkvm_mouse_button_push(&self, result: PeripheryResult, count: u8, buttons: &[u8]) {}

    /// `SET_MOUSE_MOVE_ABS` response, echoing the requested coordinates.
    fn on_vkvm_mouse_move_abs(&self, result: PeripheryResult, x: i16, y: i16) {}

    /// `SET_MOUSE_MOVE_REL` response, echoing the requested delta.
    fn on_vkvm_mouse_move_rel(&self, result: PeripheryResult, dx: i8, dy: i8) {}

    /// `SET_MOUSE_SCROLL` response, echoing the requested wheel delta.
    fn on_vkvm_mouse_scroll(&self, result: PeripheryResult, wheel: i8) {}

    /// Lets the owner remap or suppress a keycode before it is sent.
    /// Returning `NO_EVENT` (0x00) cancels the event.
    fn on_vkvm_remap_key(&self, key: u8, os_key: u32, action: RemapAction) -> u8 {
        key
    }

    /// Lets the owner remap or suppress a mouse button before it is sent.
    fn on_vkvm_remap_button(&self, button: u8, action: RemapAction) -> u8 {
        button
    }
}
