//! The embedded mirror of the host driver's reader/writer loop (§4.7): feed
//! incoming UART bytes through a [`FrameDecoder`], look up the handler for
//! the request kind in the first payload byte, and emit the response frame
//! through a [`FrameEncoder`]. No request ever blocks waiting for USB; the
//! USB-not-ready guard turns a `SET_*` into `E_HOST_WRITE_ERROR` instead.

use vkvm_protocol::catalog::{ErrorKind, InterruptKind, RequestKind, PROTOCOL_VERSION};
use vkvm_protocol::codec::{ByteSink, FrameDecoder, FrameEncoder, FrameEvent};

use crate::hid::{AbsoluteMouseReport, KeyboardReport, RelativeMouseReport};
use crate::keyboard_write;
use crate::state::PeripheryState;
use crate::HidSink;

/// A handler's successful outcome: the `S_OK` payload fields to echo back,
/// beyond the leading `0x00` response-kind byte.
enum Ok_ {
    Empty,
    U8(u8),
    U16(u16),
}

/// A handler's failure outcome. `InvalidField` carries the 0-based index of
/// the offending field, per §4.7's dispatch contract.
enum Err_ {
    InvalidField(u8),
    HostWriteError,
}

/// Drives one UART byte stream against one [`PeripheryState`] and one
/// [`HidSink`]. `H` is generic so firmware can plug in its concrete USB
/// stack without this crate depending on any particular board support
/// package.
pub struct Dispatcher<H: HidSink> {
    decoder: FrameDecoder,
    encoder: FrameEncoder,
    state: PeripheryState,
    hid: H,
}

impl<H: HidSink> Dispatcher<H> {
    pub fn new(hid: H) -> Self {
        Dispatcher { decoder: FrameDecoder::new(), encoder: FrameEncoder::new(), state: PeripheryState::new(), hid }
    }

    pub fn state(&self) -> &PeripheryState {
        &self.state
    }

    /// Called by the board's USB stack when the device's connection state
    /// to the far PC changes. Does not itself emit the interrupt frame —
    /// see [`Dispatcher::poll_interrupts`].
    pub fn set_usb_state(&mut self, state: u8) {
        self.state.usb_state = state;
    }

    /// Called by the board's USB stack when the far PC's HID output report
    /// changes the keyboard LED mask.
    pub fn set_keyboard_leds(&mut self, leds: u8) {
        self.state.keyboard_leds = leds;
    }

    /// Feeds one incoming UART byte. `now_ms` is a monotonic milliseconds
    /// clock, used only to decide whether an outgoing response frame needs
    /// a resynchronizing leading flag.
    pub fn feed_byte<S: ByteSink>(&mut self, byte: u8, now_ms: u64, uart: &mut S) {
        let state = &mut self.state;
        let hid = &mut self.hid;
        let encoder = &mut self.encoder;
        self.decoder.feed(byte, |ev| match ev {
            FrameEvent::Frame { seq, payload, err: true } => {
                let _ = respond_error(encoder, seq, ErrorKind::BrokenFrame, None, now_ms, uart);
                let _ = payload;
            }
            FrameEvent::Frame { seq, payload, err: false } => {
                dispatch_frame(state, hid, encoder, seq, payload, now_ms, uart);
            }
            FrameEvent::Malformed => {}
        });
    }

    /// Diffs the live USB/LED state against what was last reported and
    /// emits `I_USB_STATE_UPDATE` / `I_LED_UPDATE` frames for anything that
    /// changed since the previous call. A firmware main loop calls this
    /// once per iteration.
    pub fn poll_interrupts<S: ByteSink>(
        &mut self,
        last_usb_state: &mut Option<u8>,
        last_leds: &mut Option<u8>,
        now_ms: u64,
        uart: &mut S,
    ) {
        if *last_usb_state != Some(self.state.usb_state) {
            *last_usb_state = Some(self.state.usb_state);
            let _ = emit_interrupt(&mut self.encoder, InterruptKind::UsbStateUpdate, self.state.usb_state, now_ms, uart);
        }
        if *last_leds != Some(self.state.keyboard_leds) {
            *last_leds = Some(self.state.keyboard_leds);
            let _ = emit_interrupt(&mut self.encoder, InterruptKind::LedUpdate, self.state.keyboard_leds, now_ms, uart);
        }
    }
}

fn emit_interrupt<S: ByteSink>(encoder: &mut FrameEncoder, kind: InterruptKind, value: u8, now_ms: u64, uart: &mut S) -> bool {
    encoder.begin(0, now_ms, uart).is_ok()
        && encoder.write_u8(kind as u8, uart).is_ok()
        && encoder.write_u8(value, uart).is_ok()
        && encoder.end(uart).is_ok()
}

fn respond_ok<S: ByteSink>(encoder: &mut FrameEncoder, seq: u8, outcome: Ok_, now_ms: u64, uart: &mut S) -> bool {
    let started = encoder.begin(seq, now_ms, uart).is_ok() && encoder.write_u8(0x00, uart).is_ok();
    if !started {
        return false;
    }
    let wrote_fields = match outcome {
        Ok_::Empty => true,
        Ok_::U8(v) => encoder.write_u8(v, uart).is_ok(),
        Ok_::U16(v) => encoder.write_u16_be(v, uart).is_ok(),
    };
    wrote_fields && encoder.end(uart).is_ok()
}

fn respond_error<S: ByteSink>(
    encoder: &mut FrameEncoder,
    seq: u8,
    kind: ErrorKind,
    extra: Option<u8>,
    now_ms: u64,
    uart: &mut S,
) -> bool {
    let started = encoder.begin(seq, now_ms, uart).is_ok() && encoder.write_u8(kind as u8, uart).is_ok();
    if !started {
        return false;
    }
    let wrote_extra = match extra {
        Some(v) => encoder.write_u8(v, uart).is_ok(),
        None => true,
    };
    wrote_extra && encoder.end(uart).is_ok()
}

fn is_set_request(kind: RequestKind) -> bool {
    !matches!(kind, RequestKind::GetProtocolVersion | RequestKind::GetAlive | RequestKind::GetUsbState | RequestKind::GetKeyboardLeds)
}

fn dispatch_frame<H: HidSink, S: ByteSink>(
    state: &mut PeripheryState,
    hid: &mut H,
    encoder: &mut FrameEncoder,
    seq: u8,
    payload: &[u8],
    now_ms: u64,
    uart: &mut S,
) {
    let Some(&kind_byte) = payload.first() else {
        let _ = respond_error(encoder, seq, ErrorKind::InvalidReqType, Some(0), now_ms, uart);
        return;
    };
    let Some(kind) = RequestKind::from_u8(kind_byte) else {
        let _ = respond_error(encoder, seq, ErrorKind::InvalidReqType, Some(kind_byte), now_ms, uart);
        return;
    };
    let fields = &payload[1..];

    if is_set_request(kind) && !state.is_usb_ready() {
        let _ = respond_error(encoder, seq, ErrorKind::HostWriteError, None, now_ms, uart);
        return;
    }

    match handle(state, hid, kind, fields) {
        Ok(outcome) => {
            let _ = respond_ok(encoder, seq, outcome, now_ms, uart);
        }
        Err(Err_::InvalidField(index)) => {
            let _ = respond_error(encoder, seq, ErrorKind::InvalidFieldValue, Some(index), now_ms, uart);
        }
        Err(Err_::HostWriteError) => {
            let _ = respond_error(encoder, seq, ErrorKind::HostWriteError, None, now_ms, uart);
        }
    }
}

fn send_keyboard<H: HidSink>(state: &PeripheryState, hid: &mut H) {
    let report = KeyboardReport { modifier: state.keys.modifier(), reserved: 0, keys: state.keys.keys() };
    let _ = hid.send_keyboard(&report);
}

fn send_relative_mouse<H: HidSink>(state: &PeripheryState, hid: &mut H, x: i8, y: i8, wheel: i8) {
    let report = RelativeMouseReport { buttons: state.buttons.mask(), x, y, wheel };
    let _ = hid.send_relative_mouse(&report);
}

fn send_absolute_mouse<H: HidSink>(state: &PeripheryState, hid: &mut H, x: u16, y: u16) {
    let report = AbsoluteMouseReport { buttons: state.buttons.mask(), x, y, wheel: 0 };
    let _ = hid.send_absolute_mouse(&report);
}

/// Packs a bitmap of per-field outcomes, LSB = first field, matching
/// `SET_KEYBOARD_DOWN`/`UP`'s response shape (§9's open question: this
/// crate always uses the LSB-first mapping, never the shifted variant the
/// original implementation's one stray branch suggested).
fn pack_bitmap(results: &[bool]) -> u8 {
    let mut bitmap = 0u8;
    for (i, &accepted) in results.iter().enumerate() {
        if accepted {
            bitmap |= 1 << i;
        }
    }
    bitmap
}

fn handle<H: HidSink>(state: &mut PeripheryState, hid: &mut H, kind: RequestKind, fields: &[u8]) -> Result<Ok_, Err_> {
    match kind {
        RequestKind::GetProtocolVersion => Ok(Ok_::U16(PROTOCOL_VERSION)),
        RequestKind::GetAlive => Ok(Ok_::Empty),
        RequestKind::GetUsbState => Ok(Ok_::U8(state.usb_state)),
        RequestKind::GetKeyboardLeds => Ok(Ok_::U8(state.keyboard_leds)),

        RequestKind::SetKeyboardDown => {
            if fields.is_empty() || fields.len() > 6 {
                return Err(Err_::InvalidField(0));
            }
            let results: heapless::Vec<bool, 6> = fields.iter().map(|&k| state.keys.press(k)).collect();
            send_keyboard(state, hid);
            Ok(Ok_::U8(pack_bitmap(&results)))
        }
        RequestKind::SetKeyboardUp => {
            if fields.is_empty() || fields.len() > 6 {
                return Err(Err_::InvalidField(0));
            }
            let results: heapless::Vec<bool, 6> = fields.iter().map(|&k| state.keys.release(k)).collect();
            send_keyboard(state, hid);
            Ok(Ok_::U8(pack_bitmap(&results)))
        }
        RequestKind::SetKeyboardAllUp => {
            state.keys.release_all();
            send_keyboard(state, hid);
            Ok(Ok_::Empty)
        }
        RequestKind::SetKeyboardPush => {
            let mut count = 0u8;
            for &key in fields {
                let accepted = state.keys.press(key);
                send_keyboard(state, hid);
                state.keys.release(key);
                send_keyboard(state, hid);
                if accepted {
                    count += 1;
                }
            }
            Ok(Ok_::U8(count))
        }
        RequestKind::SetKeyboardWrite => {
            let Some((&modifier, keys)) = fields.split_first() else {
                return Err(Err_::InvalidField(0));
            };
            let count = keyboard_write::run(state, hid, modifier, keys);
            Ok(Ok_::U8(count))
        }

        RequestKind::SetMouseButtonDown => {
            if fields.is_empty() || fields.len() > 3 {
                return Err(Err_::InvalidField(0));
            }
            for &button in fields {
                state.buttons.press(button);
            }
            send_relative_mouse(state, hid, 0, 0, 0);
            Ok(Ok_::Empty)
        }
        RequestKind::SetMouseButtonUp => {
            if fields.is_empty() || fields.len() > 3 {
                return Err(Err_::InvalidField(0));
            }
            for &button in fields {
                state.buttons.release(button);
            }
            send_relative_mouse(state, hid, 0, 0, 0);
            Ok(Ok_::Empty)
        }
        RequestKind::SetMouseButtonAllUp => {
            state.buttons.release_all();
            send_relative_mouse(state, hid, 0, 0, 0);
            Ok(Ok_::Empty)
        }
        RequestKind::SetMouseButtonPush => {
            let mut count = 0u8;
            for &button in fields {
                state.buttons.press(button);
                send_relative_mouse(state, hid, 0, 0, 0);
                state.buttons.release(button);
                send_relative_mouse(state, hid, 0, 0, 0);
                count += 1;
            }
            Ok(Ok_::U8(count))
        }
        RequestKind::SetMouseMoveAbs => {
            if fields.len() < 4 {
                return Err(Err_::InvalidField(0));
            }
            let x = i16::from_be_bytes([fields[0], fields[1]]);
            let y = i16::from_be_bytes([fields[2], fields[3]]);
            if !(0..=0x7FFF).contains(&x) {
                return Err(Err_::InvalidField(0));
            }
            if !(0..=0x7FFF).contains(&y) {
                return Err(Err_::InvalidField(1));
            }
            send_absolute_mouse(state, hid, x as u16, y as u16);
            Ok(Ok_::Empty)
        }
        RequestKind::SetMouseMoveRel => {
            if fields.len() < 2 {
                return Err(Err_::InvalidField(0));
            }
            send_relative_mouse(state, hid, fields[0] as i8, fields[1] as i8, 0);
            Ok(Ok_::Empty)
        }
        RequestKind::SetMouseScroll => {
            if fields.is_empty() {
                return Err(Err_::InvalidField(0));
            }
            send_relative_mouse(state, hid, 0, 0, fields[0] as i8);
            Ok(Ok_::Empty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingHid;
    use std::vec::Vec;
    use vkvm_protocol::catalog::usb_state;

    fn feed_frame(dispatcher: &mut Dispatcher<RecordingHid>, seq: u8, payload: &[u8], uart: &mut Vec<u8>) {
        let mut enc = FrameEncoder::new();
        enc.begin(seq, 0, uart).unwrap();
        enc.write_bytes(payload, uart).unwrap();
        enc.end(uart).unwrap();
        let bytes = core::mem::take(uart);
        for b in bytes {
            dispatcher.feed_byte(b, 0, uart);
        }
    }

    fn decode_one(bytes: &[u8]) -> (u8, Vec<u8>) {
        let mut dec = FrameDecoder::new();
        let mut result = None;
        for &b in bytes {
            dec.feed(b, |ev| {
                if let FrameEvent::Frame { seq, payload, err: false } = ev {
                    result = Some((seq, payload.to_vec()));
                }
            });
        }
        result.expect("a well-formed response frame")
    }

    #[test]
    fn get_protocol_version_replies_with_the_current_version() {
        let mut dispatcher = Dispatcher::new(RecordingHid::default());
        let mut out = Vec::new();
        feed_frame(&mut dispatcher, 1, &[RequestKind::GetProtocolVersion as u8], &mut out);
        let (seq, payload) = decode_one(&out);
        assert_eq!(seq, 1);
        assert_eq!(payload, vec![0x00, 0x01, 0x00]);
    }

    #[test]
    fn unknown_request_kind_yields_invalid_req_type() {
        let mut dispatcher = Dispatcher::new(RecordingHid::default());
        let mut out = Vec::new();
        feed_frame(&mut dispatcher, 2, &[0xF0], &mut out);
        let (_, payload) = decode_one(&out);
        assert_eq!(payload, vec![ErrorKind::InvalidReqType as u8, 0xF0]);
    }

    #[test]
    fn set_request_before_usb_configured_yields_host_write_error() {
        let mut dispatcher = Dispatcher::new(RecordingHid::default());
        let mut out = Vec::new();
        feed_frame(&mut dispatcher, 3, &[RequestKind::SetKeyboardAllUp as u8], &mut out);
        let (_, payload) = decode_one(&out);
        assert_eq!(payload, vec![ErrorKind::HostWriteError as u8]);
    }

    #[test]
    fn keyboard_push_reports_one_accepted_and_emits_press_then_release() {
        let mut dispatcher = Dispatcher::new(RecordingHid::default());
        dispatcher.set_usb_state(usb_state::CONFIGURED);
        let mut out = Vec::new();
        feed_frame(&mut dispatcher, 4, &[RequestKind::SetKeyboardPush as u8, vkvm_protocol::hidkeys::A], &mut out);
        let (_, payload) = decode_one(&out);
        assert_eq!(payload, vec![0x00, 0x01]);
        let reports = &dispatcher.hid.keyboard;
        assert_eq!(reports[reports.len() - 2].keys[0], vkvm_protocol::hidkeys::A);
        assert_eq!(reports[reports.len() - 1].keys, [0; 6]);
    }

    #[test]
    fn set_keyboard_down_rejects_a_seventh_rollover_key() {
        let mut dispatcher = Dispatcher::new(RecordingHid::default());
        dispatcher.set_usb_state(usb_state::CONFIGURED);
        let mut out = Vec::new();
        let six = [
            vkvm_protocol::hidkeys::A,
            vkvm_protocol::hidkeys::B,
            vkvm_protocol::hidkeys::C,
            vkvm_protocol::hidkeys::D,
            vkvm_protocol::hidkeys::E,
            vkvm_protocol::hidkeys::F,
        ];
        let mut payload = vec![RequestKind::SetKeyboardDown as u8];
        payload.extend_from_slice(&six);
        feed_frame(&mut dispatcher, 5, &payload, &mut out);
        let (_, response) = decode_one(&out);
        assert_eq!(response, vec![0x00, 0b0011_1111]);

        out.clear();
        feed_frame(&mut dispatcher, 6, &[RequestKind::SetKeyboardDown as u8, vkvm_protocol::hidkeys::G], &mut out);
        let (_, response) = decode_one(&out);
        assert_eq!(response, vec![0x00, 0b0000_0000]);
    }

    #[test]
    fn set_mouse_move_abs_out_of_range_names_the_offending_field() {
        let mut dispatcher = Dispatcher::new(RecordingHid::default());
        dispatcher.set_usb_state(usb_state::CONFIGURED);
        let mut out = Vec::new();
        let mut payload = vec![RequestKind::SetMouseMoveAbs as u8];
        payload.extend_from_slice(&(-1i16).to_be_bytes());
        payload.extend_from_slice(&0i16.to_be_bytes());
        feed_frame(&mut dispatcher, 7, &payload, &mut out);
        let (_, response) = decode_one(&out);
        assert_eq!(response, vec![ErrorKind::InvalidFieldValue as u8, 0]);
    }

    #[test]
    fn poll_interrupts_emits_a_frame_only_on_change() {
        let mut dispatcher = Dispatcher::new(RecordingHid::default());
        let mut last_usb_state = None;
        let mut last_leds = None;
        let mut out = Vec::new();
        dispatcher.poll_interrupts(&mut last_usb_state, &mut last_leds, 0, &mut out);
        assert!(!out.is_empty());

        out.clear();
        dispatcher.poll_interrupts(&mut last_usb_state, &mut last_leds, 0, &mut out);
        assert!(out.is_empty());

        dispatcher.set_usb_state(usb_state::CONFIGURED);
        dispatcher.poll_interrupts(&mut last_usb_state, &mut last_leds, 0, &mut out);
        let (seq, payload) = decode_one(&out);
        assert_eq!(seq, 0);
        assert_eq!(payload, vec![InterruptKind::UsbStateUpdate as u8, usb_state::CONFIGURED]);
    }
}
