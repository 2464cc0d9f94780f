//! USB HID Usage Tables v1.11 §10 (Keyboard/Keypad Page) keycodes, the
//! keyboard LED bitmask, and the `SET_KEYBOARD_WRITE` modifier bitmask.
//!
//! These are wire-level constants, not opinions: both `vkvm-input` (mapping
//! OS scancodes onto them) and `vkvm-periphery` (mapping them onto USB HID
//! boot-keyboard report bytes) read this module rather than keeping their
//! own copies.

/// Sentinel meaning "no key" / "no event". A remap callback returns this to
/// cancel the event instead of forwarding it.
pub const NO_EVENT: u8 = 0x00;

pub const ERROR_ROLL_OVER: u8 = 0x01;
pub const POST_FAIL: u8 = 0x02;
pub const ERROR_UNDEFINED: u8 = 0x03;

pub const A: u8 = 0x04;
pub const B: u8 = 0x05;
pub const C: u8 = 0x06;
pub const D: u8 = 0x07;
pub const E: u8 = 0x08;
pub const F: u8 = 0x09;
pub const G: u8 = 0x0A;
pub const H: u8 = 0x0B;
pub const I: u8 = 0x0C;
pub const J: u8 = 0x0D;
pub const K: u8 = 0x0E;
pub const L: u8 = 0x0F;
pub const M: u8 = 0x10;
pub const N: u8 = 0x11;
pub const O: u8 = 0x12;
pub const P: u8 = 0x13;
pub const Q: u8 = 0x14;
pub const R: u8 = 0x15;
pub const S: u8 = 0x16;
pub const T: u8 = 0x17;
pub const U: u8 = 0x18;
pub const V: u8 = 0x19;
pub const W: u8 = 0x1A;
pub const X: u8 = 0x1B;
pub const Y: u8 = 0x1C;
pub const Z: u8 = 0x1D;

pub const DIGIT1: u8 = 0x1E;
pub const DIGIT2: u8 = 0x1F;
pub const DIGIT3: u8 = 0x20;
pub const DIGIT4: u8 = 0x21;
pub const DIGIT5: u8 = 0x22;
pub const DIGIT6: u8 = 0x23;
pub const DIGIT7: u8 = 0x24;
pub const DIGIT8: u8 = 0x25;
pub const DIGIT9: u8 = 0x26;
pub const DIGIT0: u8 = 0x27;

pub const ENTER: u8 = 0x28;
pub const ESCAPE: u8 = 0x29;
pub const BACKSPACE: u8 = 0x2A;
pub const TAB: u8 = 0x2B;
pub const SPACE: u8 = 0x2C;
pub const MINUS: u8 = 0x2D;
pub const EQUAL: u8 = 0x2E;
pub const OPEN_BRACKET: u8 = 0x2F;
pub const CLOSE_BRACKET: u8 = 0x30;
pub const BACKSLASH: u8 = 0x31;
pub const NON_US_HASH: u8 = 0x32;
pub const SEMICOLON: u8 = 0x33;
pub const APOSTROPHE: u8 = 0x34;
pub const ACCENT: u8 = 0x35;
pub const COMMA: u8 = 0x36;
pub const PERIOD: u8 = 0x37;
pub const SLASH: u8 = 0x38;
pub const CAPS_LOCK: u8 = 0x39;

pub const F1: u8 = 0x3A;
pub const F2: u8 = 0x3B;
pub const F3: u8 = 0x3C;
pub const F4: u8 = 0x3D;
pub const F5: u8 = 0x3E;
pub const F6: u8 = 0x3F;
pub const F7: u8 = 0x40;
pub const F8: u8 = 0x41;
pub const F9: u8 = 0x42;
pub const F10: u8 = 0x43;
pub const F11: u8 = 0x44;
pub const F12: u8 = 0x45;

pub const PRINT_SCREEN: u8 = 0x46;
pub const SCROLL_LOCK: u8 = 0x47;
pub const PAUSE: u8 = 0x48;
pub const INSERT: u8 = 0x49;
pub const HOME: u8 = 0x4A;
pub const PAGE_UP: u8 = 0x4B;
pub const DELETE: u8 = 0x4C;
pub const END: u8 = 0x4D;
pub const PAGE_DOWN: u8 = 0x4E;
pub const RIGHT_ARROW: u8 = 0x4F;
pub const LEFT_ARROW: u8 = 0x50;
pub const DOWN_ARROW: u8 = 0x51;
pub const UP_ARROW: u8 = 0x52;

pub const NUM_LOCK: u8 = 0x53;
pub const KP_DIVIDE: u8 = 0x54;
pub const KP_MULTIPLY: u8 = 0x55;
pub const KP_SUBTRACT: u8 = 0x56;
pub const KP_ADD: u8 = 0x57;
pub const KP_ENTER: u8 = 0x58;
pub const KP_1: u8 = 0x59;
pub const KP_2: u8 = 0x5A;
pub const KP_3: u8 = 0x5B;
pub const KP_4: u8 = 0x5C;
pub const KP_5: u8 = 0x5D;
pub const KP_6: u8 = 0x5E;
pub const KP_7: u8 = 0x5F;
pub const KP_8: u8 = 0x60;
pub const KP_9: u8 = 0x61;
pub const KP_0: u8 = 0x62;
pub const KP_DECIMAL: u8 = 0x63;

pub const NON_US_BACKSLASH: u8 = 0x64;
pub const APPLICATION: u8 = 0x65;
pub const POWER: u8 = 0x66;
pub const KP_EQUAL: u8 = 0x67;

pub const F13: u8 = 0x68;
pub const F14: u8 = 0x69;
pub const F15: u8 = 0x6A;
pub const F16: u8 = 0x6B;
pub const F17: u8 = 0x6C;
pub const F18: u8 = 0x6D;
pub const F19: u8 = 0x6E;
pub const F20: u8 = 0x6F;
pub const F21: u8 = 0x70;
pub const F22: u8 = 0x71;
pub const F23: u8 = 0x72;
pub const F24: u8 = 0x73;

pub const MENU: u8 = 0x76;

pub const INT_2_KANA: u8 = 0x88;
pub const INT_4_CONVERT: u8 = 0x8A;
pub const INT_5_NONCONVERT: u8 = 0x8B;

pub const LEFT_CONTROL: u8 = 0xE0;
pub const LEFT_SHIFT: u8 = 0xE1;
pub const LEFT_ALT: u8 = 0xE2;
pub const LEFT_GUI: u8 = 0xE3;
pub const RIGHT_CONTROL: u8 = 0xE4;
pub const RIGHT_SHIFT: u8 = 0xE5;
pub const RIGHT_ALT: u8 = 0xE6;
pub const RIGHT_GUI: u8 = 0xE7;

/// `true` for any of the eight standard modifier keycodes
/// (`LEFT_CONTROL..=RIGHT_GUI`).
pub const fn is_modifier(key: u8) -> bool {
    matches!(key, LEFT_CONTROL..=RIGHT_GUI)
}

/// Boot-keyboard modifier bitmask position for a modifier keycode, or `None`
/// if `key` is not one of the eight modifiers. Matches the HID boot report's
/// byte 0 layout: bit 0 = left ctrl .. bit 7 = right GUI.
pub const fn modifier_bit(key: u8) -> Option<u8> {
    if !is_modifier(key) {
        return None;
    }
    Some(1u8 << (key - LEFT_CONTROL))
}

/// Keyboard indicator LED bitmask, as reported by `GET_KEYBOARD_LEDS` and
/// `I_LED_UPDATE`.
pub mod led {
    pub const NUM_LOCK: u8 = 0x01;
    pub const CAPS_LOCK: u8 = 0x02;
    pub const SCROLL_LOCK: u8 = 0x04;
    pub const COMPOSE: u8 = 0x08;
    pub const KANA: u8 = 0x10;
    pub const POWER: u8 = 0x20;
    pub const SHIFT: u8 = 0x40;
    pub const DO_NOT_DISTURB: u8 = 0x80;
}

/// `SET_KEYBOARD_WRITE`'s modifier byte: desired modifier-held and
/// NumLock/Kana-toggled state, independent of the boot report's own
/// modifier byte layout.
pub mod write_modifier {
    pub const NONE: u8 = 0x00;
    pub const LEFT_CONTROL: u8 = 0x01;
    pub const LEFT_SHIFT: u8 = 0x02;
    pub const LEFT_ALT: u8 = 0x04;
    pub const RIGHT_CONTROL: u8 = 0x08;
    pub const RIGHT_SHIFT: u8 = 0x10;
    pub const RIGHT_ALT: u8 = 0x20;
    pub const NUM_LOCK: u8 = 0x40;
    pub const KANA: u8 = 0x80;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_bit_covers_the_full_range_lsb_first() {
        assert_eq!(modifier_bit(LEFT_CONTROL), Some(0x01));
        assert_eq!(modifier_bit(LEFT_SHIFT), Some(0x02));
        assert_eq!(modifier_bit(RIGHT_GUI), Some(0x80));
        assert_eq!(modifier_bit(A), None);
    }

    #[test]
    fn is_modifier_excludes_ordinary_keys() {
        assert!(is_modifier(LEFT_ALT));
        assert!(!is_modifier(SPACE));
        assert!(!is_modifier(NO_EVENT));
    }
}
