//! A minimal ASCII-to-USB-HID mapping for the `type` subcommand's smoke
//! test. Deliberately not a general clipboard-paste encoder (ALT-codes,
//! ISO/IEC 14755, Vi digraphs are out of scope per the core's Non-goals) —
//! just enough of the printable ASCII range to exercise `keyboard_write`
//! end to end from a terminal.

use vkvm_protocol::hidkeys as hid;

/// Looks up the keycode and whether Shift is needed for one ASCII byte.
/// Returns `None` for anything this mapper doesn't know (CLI surfaces that
/// as a skipped character rather than failing the whole command).
pub fn ascii_to_hid(ch: u8) -> Option<(u8, bool)> {
    Some(match ch {
        b'a'..=b'z' => (hid::A + (ch - b'a'), false),
        b'A'..=b'Z' => (hid::A + (ch - b'A'), true),
        b'1'..=b'9' => (hid::DIGIT1 + (ch - b'1'), false),
        b'0' => (hid::DIGIT0, false),
        b' ' => (hid::SPACE, false),
        b'\n' => (hid::ENTER, false),
        b'\t' => (hid::TAB, false),
        b'-' => (hid::MINUS, false),
        b'=' => (hid::EQUAL, false),
        b',' => (hid::COMMA, false),
        b'.' => (hid::PERIOD, false),
        b'/' => (hid::SLASH, false),
        b';' => (hid::SEMICOLON, false),
        b'\'' => (hid::APOSTROPHE, false),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_and_uppercase_share_a_keycode_but_differ_in_shift() {
        let (lower, shift_lower) = ascii_to_hid(b'a').unwrap();
        let (upper, shift_upper) = ascii_to_hid(b'A').unwrap();
        assert_eq!(lower, upper);
        assert!(!shift_lower);
        assert!(shift_upper);
    }

    #[test]
    fn digits_map_in_order() {
        assert_eq!(ascii_to_hid(b'1').unwrap().0, hid::DIGIT1);
        assert_eq!(ascii_to_hid(b'0').unwrap().0, hid::DIGIT0);
    }

    #[test]
    fn unmapped_bytes_return_none() {
        assert!(ascii_to_hid(0x01).is_none());
    }
}
