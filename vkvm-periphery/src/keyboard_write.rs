//! The `SET_KEYBOARD_WRITE` sequencing described in §4.5: release everything,
//! reconcile NumLock/Kana against the requested toggle state, hold the
//! requested modifiers, then push each key in turn — folding any modifier
//! keycode found in the key buffer into the held-modifier set instead of
//! sending it as its own press/release pair.

use vkvm_protocol::hidkeys as hid;

use crate::hid::KeyboardReport;
use crate::state::PeripheryState;
use crate::HidSink;

fn report_for(state: &PeripheryState) -> KeyboardReport {
    KeyboardReport { modifier: state.keys.modifier(), reserved: 0, keys: state.keys.keys() }
}

fn send<H: HidSink>(state: &PeripheryState, hid_sink: &mut H) {
    let report = report_for(state);
    let _ = hid_sink.send_keyboard(&report);
}

/// Bit positions within `write_modifier` that correspond to a held (not
/// toggled) modifier, in the same left-to-right order as the boot report's
/// modifier byte.
const HELD_MODIFIERS: [(u8, u8); 6] = [
    (vkvm_protocol::hidkeys::write_modifier::LEFT_CONTROL, hid::LEFT_CONTROL),
    (vkvm_protocol::hidkeys::write_modifier::LEFT_SHIFT, hid::LEFT_SHIFT),
    (vkvm_protocol::hidkeys::write_modifier::LEFT_ALT, hid::LEFT_ALT),
    (vkvm_protocol::hidkeys::write_modifier::RIGHT_CONTROL, hid::RIGHT_CONTROL),
    (vkvm_protocol::hidkeys::write_modifier::RIGHT_SHIFT, hid::RIGHT_SHIFT),
    (vkvm_protocol::hidkeys::write_modifier::RIGHT_ALT, hid::RIGHT_ALT),
];

/// Runs the full write sequence and returns how many of `keys` were
/// successfully pushed.
pub fn run<H: HidSink>(state: &mut PeripheryState, hid_sink: &mut H, modifier: u8, keys: &[u8]) -> u8 {
    // Step 1: release everything.
    state.keys.release_all();
    send(state, hid_sink);

    // Step 2: reconcile NumLock/Kana toggle state against the current LEDs.
    let want_num_lock = modifier & vkvm_protocol::hidkeys::write_modifier::NUM_LOCK != 0;
    let have_num_lock = state.keyboard_leds & vkvm_protocol::hidkeys::led::NUM_LOCK != 0;
    let want_kana = modifier & vkvm_protocol::hidkeys::write_modifier::KANA != 0;
    let have_kana = state.keyboard_leds & vkvm_protocol::hidkeys::led::KANA != 0;

    if want_num_lock != have_num_lock {
        push_one(state, hid_sink, hid::NUM_LOCK);
    }
    if want_kana != have_kana {
        push_one(state, hid_sink, hid::INT_2_KANA);
    }

    // Step 3: hold the requested non-toggling modifiers.
    for &(bit, key) in HELD_MODIFIERS.iter() {
        if modifier & bit != 0 {
            state.keys.press(key);
        }
    }
    send(state, hid_sink);

    // Step 4: push each key, folding any modifier keycode found in the
    // buffer into the held set instead of sending it as its own event.
    let mut count = 0u8;
    for &key in keys {
        if key == hid::NO_EVENT {
            continue;
        }
        if vkvm_protocol::hidkeys::is_modifier(key) {
            state.keys.toggle_modifier(key);
            send(state, hid_sink);
            continue;
        }
        if push_one(state, hid_sink, key) {
            count += 1;
        }
    }

    // Step 5: release modifiers and revert NumLock/Kana if toggled.
    state.keys.release_all();
    send(state, hid_sink);
    if want_num_lock != have_num_lock {
        push_one(state, hid_sink, hid::NUM_LOCK);
    }
    if want_kana != have_kana {
        push_one(state, hid_sink, hid::INT_2_KANA);
    }

    count
}

fn push_one<H: HidSink>(state: &mut PeripheryState, hid_sink: &mut H, key: u8) -> bool {
    let accepted = state.keys.press(key);
    send(state, hid_sink);
    state.keys.release(key);
    send(state, hid_sink);
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingHid;

    #[test]
    fn holds_requested_modifiers_across_every_key_report() {
        let mut state = PeripheryState::new();
        let mut hid_sink = RecordingHid::default();
        let modifier = vkvm_protocol::hidkeys::write_modifier::LEFT_SHIFT;

        let accepted = run(&mut state, &mut hid_sink, modifier, &[hid::A, hid::B]);

        assert_eq!(accepted, 2);
        // Every report between the initial release and the final release
        // carries the held shift modifier, including the per-key push/pop.
        for report in &hid_sink.keyboard[1..hid_sink.keyboard.len() - 1] {
            assert_eq!(report.modifier, 0x02);
        }
        // The sequence ends with everything released.
        let last = hid_sink.keyboard.last().unwrap();
        assert_eq!(last.modifier, 0);
        assert_eq!(last.keys, [0; 6]);
    }

    #[test]
    fn toggles_num_lock_on_then_reverts_it_when_leds_disagree() {
        let mut state = PeripheryState::new();
        state.keyboard_leds = 0; // NumLock currently off
        let mut hid_sink = RecordingHid::default();
        let modifier = vkvm_protocol::hidkeys::write_modifier::NUM_LOCK;

        run(&mut state, &mut hid_sink, modifier, &[hid::KP_1]);

        // NUM_LOCK should appear twice as its own push/release pair: once to
        // turn it on up front, once to revert it at the end.
        let num_lock_presses = hid_sink.keyboard.iter().filter(|r| r.keys.contains(&hid::NUM_LOCK)).count();
        assert_eq!(num_lock_presses, 2);
        // Final state has nothing held.
        let last = hid_sink.keyboard.last().unwrap();
        assert_eq!(last.modifier, 0);
        assert_eq!(last.keys, [0; 6]);
    }

    #[test]
    fn skips_num_lock_reconciliation_when_leds_already_match() {
        let mut state = PeripheryState::new();
        state.keyboard_leds = vkvm_protocol::hidkeys::led::NUM_LOCK; // already on
        let mut hid_sink = RecordingHid::default();
        let modifier = vkvm_protocol::hidkeys::write_modifier::NUM_LOCK;

        run(&mut state, &mut hid_sink, modifier, &[hid::KP_1]);

        let num_lock_presses = hid_sink.keyboard.iter().filter(|r| r.keys.contains(&hid::NUM_LOCK)).count();
        assert_eq!(num_lock_presses, 0);
    }

    #[test]
    fn folds_a_modifier_keycode_found_in_the_key_buffer_into_the_held_set() {
        let mut state = PeripheryState::new();
        let mut hid_sink = RecordingHid::default();

        let accepted = run(&mut state, &mut hid_sink, 0, &[hid::LEFT_CONTROL, hid::A]);

        // Only the non-modifier key counts toward the accepted tally; the
        // modifier is folded into the held set instead of push/released.
        assert_eq!(accepted, 1);
        let saw_ctrl_and_a_together =
            hid_sink.keyboard.iter().any(|r| r.modifier & 0x01 != 0 && r.keys.contains(&hid::A));
        assert!(saw_ctrl_and_a_together);
    }

    #[test]
    fn a_repeated_modifier_keycode_toggles_rather_than_sets() {
        let mut state = PeripheryState::new();
        let mut hid_sink = RecordingHid::default();

        // Ctrl appears twice in the buffer: toggled on, then back off, so it
        // should not still be held by the time A is pushed.
        let accepted = run(&mut state, &mut hid_sink, 0, &[hid::LEFT_CONTROL, hid::LEFT_CONTROL, hid::A]);

        assert_eq!(accepted, 1);
        let saw_ctrl_held_with_a = hid_sink.keyboard.iter().any(|r| r.modifier & 0x01 != 0 && r.keys.contains(&hid::A));
        assert!(!saw_ctrl_held_with_a);
    }

    #[test]
    fn ignores_no_event_placeholders_in_the_key_buffer() {
        let mut state = PeripheryState::new();
        let mut hid_sink = RecordingHid::default();

        let accepted = run(&mut state, &mut hid_sink, 0, &[hid::NO_EVENT, hid::A, hid::NO_EVENT]);

        assert_eq!(accepted, 1);
    }
}
