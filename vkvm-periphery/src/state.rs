//! Everything the dispatcher needs to remember between requests: which keys
//! and buttons are currently held (so `SET_KEYBOARD_PUSH` and
//! `SET_MOUSE_BUTTON_PUSH` can restore them), the last USB connection state,
//! and the last keyboard LED mask reported by the far PC.

use vkvm_protocol::catalog::usb_state;

/// Up to six simultaneously held non-modifier keycodes, mirroring the boot
/// keyboard report's 6-key rollover slots.
#[derive(Debug, Default)]
pub struct HeldKeys {
    slots: [u8; 6],
    modifier: u8,
}

impl HeldKeys {
    pub const fn new() -> Self {
        HeldKeys { slots: [0; 6], modifier: 0 }
    }

    /// Adds `key` to a free rollover slot (or the modifier byte, for the
    /// eight standard modifiers). Returns `false` if `key` is already held
    /// or there is no free slot — the caller reports that key as not
    /// accepted in the response bitmap.
    pub fn press(&mut self, key: u8) -> bool {
        if key == vkvm_protocol::hidkeys::NO_EVENT {
            return false;
        }
        if let Some(bit) = vkvm_protocol::hidkeys::modifier_bit(key) {
            let was_set = self.modifier & bit != 0;
            self.modifier |= bit;
            return !was_set;
        }
        if self.slots.contains(&key) {
            return false;
        }
        for slot in self.slots.iter_mut() {
            if *slot == 0 {
                *slot = key;
                return true;
            }
        }
        false
    }

    /// Flips a modifier key's held bit rather than setting it, for
    /// `SET_KEYBOARD_WRITE`'s "toggle any modifier byte found in the
    /// buffer" rule. `key` must be a modifier keycode; no-op otherwise.
    pub fn toggle_modifier(&mut self, key: u8) {
        if let Some(bit) = vkvm_protocol::hidkeys::modifier_bit(key) {
            self.modifier ^= bit;
        }
    }

    /// Removes `key`, whether held as a modifier or a rollover slot.
    /// Returns `true` if it had been held.
    pub fn release(&mut self, key: u8) -> bool {
        if let Some(bit) = vkvm_protocol::hidkeys::modifier_bit(key) {
            let was_set = self.modifier & bit != 0;
            self.modifier &= !bit;
            return was_set;
        }
        for slot in self.slots.iter_mut() {
            if *slot == key {
                *slot = 0;
                return true;
            }
        }
        false
    }

    pub fn release_all(&mut self) {
        self.slots = [0; 6];
        self.modifier = 0;
    }

    pub fn modifier(&self) -> u8 {
        self.modifier
    }

    pub fn keys(&self) -> [u8; 6] {
        self.slots
    }
}

/// Held mouse buttons, as a bitmask over `mouse_button::{LEFT,RIGHT,MIDDLE}`.
#[derive(Debug, Default)]
pub struct HeldButtons {
    mask: u8,
}

impl HeldButtons {
    pub const fn new() -> Self {
        HeldButtons { mask: 0 }
    }

    pub fn press(&mut self, button: u8) -> bool {
        let was_set = self.mask & button != 0;
        self.mask |= button;
        !was_set
    }

    pub fn release(&mut self, button: u8) -> bool {
        let was_set = self.mask & button != 0;
        self.mask &= !button;
        was_set
    }

    pub fn release_all(&mut self) {
        self.mask = 0;
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }
}

/// The dispatcher's full mutable state, threaded through every request
/// handler. Also the source of truth the interrupt loop diffs against to
/// decide whether to emit `I_USB_STATE_UPDATE` / `I_LED_UPDATE`.
#[derive(Debug)]
pub struct PeripheryState {
    pub keys: HeldKeys,
    pub buttons: HeldButtons,
    pub usb_state: u8,
    pub keyboard_leds: u8,
}

impl Default for PeripheryState {
    fn default() -> Self {
        PeripheryState { keys: HeldKeys::new(), buttons: HeldButtons::new(), usb_state: usb_state::DETACHED, keyboard_leds: 0 }
    }
}

impl PeripheryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_usb_ready(&self) -> bool {
        self.usb_state == usb_state::CONFIGURED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_keys_rejects_a_duplicate_press() {
        let mut keys = HeldKeys::new();
        assert!(keys.press(vkvm_protocol::hidkeys::A));
        assert!(!keys.press(vkvm_protocol::hidkeys::A));
    }

    #[test]
    fn held_keys_tracks_modifiers_separately_from_rollover_slots() {
        let mut keys = HeldKeys::new();
        assert!(keys.press(vkvm_protocol::hidkeys::LEFT_SHIFT));
        assert_eq!(keys.modifier(), 0x02);
        assert_eq!(keys.keys(), [0; 6]);
    }

    #[test]
    fn held_keys_fails_closed_past_six_rollover_slots() {
        let mut keys = HeldKeys::new();
        for key in [
            vkvm_protocol::hidkeys::A,
            vkvm_protocol::hidkeys::B,
            vkvm_protocol::hidkeys::C,
            vkvm_protocol::hidkeys::D,
            vkvm_protocol::hidkeys::E,
            vkvm_protocol::hidkeys::F,
        ] {
            assert!(keys.press(key));
        }
        assert!(!keys.press(vkvm_protocol::hidkeys::G));
    }

    #[test]
    fn held_buttons_round_trip() {
        let mut buttons = HeldButtons::new();
        assert!(buttons.press(vkvm_protocol::catalog::mouse_button::LEFT));
        assert_eq!(buttons.mask(), 0x01);
        assert!(buttons.release(vkvm_protocol::catalog::mouse_button::LEFT));
        assert_eq!(buttons.mask(), 0x00);
    }
}
