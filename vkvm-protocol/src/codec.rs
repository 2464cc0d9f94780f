//! The HDLC-style framing codec: `begin`/`write*`/`end` on the encode side,
//! `feed` on the decode side. Neither side allocates; the decoder holds its
//! working frame in a fixed `MAX_FRAME_SIZE`-byte array.

use crate::catalog::{ESC, ESC_XOR, FLAG, MAX_FRAME_SIZE};
use crate::crc;
use crate::error::FrameError;

/// A destination for encoded bytes. Implemented by the serial transport on
/// the host and by the UART driver on the periphery.
pub trait ByteSink {
    /// Writes one byte, returning `false` if the sink cannot accept it
    /// (e.g. the underlying write call failed or timed out).
    fn put(&mut self, byte: u8) -> bool;
}

#[cfg(any(test, feature = "test-util"))]
impl ByteSink for std::vec::Vec<u8> {
    fn put(&mut self, byte: u8) -> bool {
        self.push(byte);
        true
    }
}

fn emit_stuffed<S: ByteSink>(byte: u8, sink: &mut S) -> Result<(), FrameError> {
    if byte == FLAG || byte == ESC {
        if !sink.put(ESC) {
            return Err(FrameError::SendError);
        }
        if !sink.put(byte ^ ESC_XOR) {
            return Err(FrameError::SendError);
        }
    } else if !sink.put(byte) {
        return Err(FrameError::SendError);
    }
    Ok(())
}

/// A link is considered idle, and therefore due a resynchronizing leading
/// flag, after this many milliseconds without a completed write.
pub const IDLE_RESYNC_MS: u64 = 1000;

/// Encodes one frame at a time: `begin(seq)`, any number of `write*` calls,
/// then `end()`. Tracks its own running CRC and last-activity timestamp so
/// it can decide whether a leading flag is needed to resynchronize a lazy
/// link.
pub struct FrameEncoder {
    crc: u16,
    last_activity_ms: Option<u64>,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self { crc: crc::INIT, last_activity_ms: None }
    }

    /// Starts a frame with the given sequence number. `now_ms` is a
    /// monotonic milliseconds timestamp used only to decide whether a
    /// leading flag is needed.
    pub fn begin<S: ByteSink>(&mut self, seq: u8, now_ms: u64, sink: &mut S) -> Result<(), FrameError> {
        let need_leading_flag = match self.last_activity_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) > IDLE_RESYNC_MS,
        };
        if need_leading_flag && !sink.put(FLAG) {
            return Err(FrameError::SendError);
        }
        self.crc = crc::INIT;
        self.last_activity_ms = Some(now_ms);
        self.write_u8(seq, sink)
    }

    fn fold_and_emit<S: ByteSink>(&mut self, byte: u8, sink: &mut S) -> Result<(), FrameError> {
        self.crc = crc::update(self.crc, byte);
        emit_stuffed(byte, sink)
    }

    pub fn write_u8<S: ByteSink>(&mut self, value: u8, sink: &mut S) -> Result<(), FrameError> {
        self.fold_and_emit(value, sink)
    }

    pub fn write_i8<S: ByteSink>(&mut self, value: i8, sink: &mut S) -> Result<(), FrameError> {
        self.write_u8(value as u8, sink)
    }

    pub fn write_bytes<S: ByteSink>(&mut self, bytes: &[u8], sink: &mut S) -> Result<(), FrameError> {
        for &b in bytes {
            self.fold_and_emit(b, sink)?;
        }
        Ok(())
    }

    pub fn write_u16_be<S: ByteSink>(&mut self, value: u16, sink: &mut S) -> Result<(), FrameError> {
        self.write_bytes(&value.to_be_bytes(), sink)
    }

    pub fn write_i16_be<S: ByteSink>(&mut self, value: i16, sink: &mut S) -> Result<(), FrameError> {
        self.write_u16_be(value as u16, sink)
    }

    pub fn write_u32_be<S: ByteSink>(&mut self, value: u32, sink: &mut S) -> Result<(), FrameError> {
        self.write_bytes(&value.to_be_bytes(), sink)
    }

    pub fn write_i32_be<S: ByteSink>(&mut self, value: i32, sink: &mut S) -> Result<(), FrameError> {
        self.write_u32_be(value as u32, sink)
    }

    /// Appends the big-endian CRC and the closing flag. The closing flag
    /// doubles as the next frame's opening flag unless the link goes idle.
    pub fn end<S: ByteSink>(&mut self, sink: &mut S) -> Result<(), FrameError> {
        let final_crc = self.crc ^ 0xFFFF;
        emit_stuffed((final_crc >> 8) as u8, sink)?;
        emit_stuffed((final_crc & 0xFF) as u8, sink)?;
        if !sink.put(FLAG) {
            return Err(FrameError::SendError);
        }
        Ok(())
    }
}

/// One frame delivered by [`FrameDecoder::feed`].
#[derive(Debug, Copy, Clone)]
pub enum FrameEvent<'a> {
    /// A structurally valid frame. `err` is `true` on CRC mismatch; the
    /// caller decides what that means (the host driver reports a broken
    /// frame and keeps the connection up).
    Frame { seq: u8, payload: &'a [u8], err: bool },
    /// Frame shorter than seq + 1 payload byte + 2-byte CRC; no further
    /// detail is extractable.
    Malformed,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum DecoderState {
    SearchFlag,
    InFrame,
    Escaped,
}

/// Feeds a byte stream and reassembles frames. Holds a fixed
/// `MAX_FRAME_SIZE`-byte buffer; never allocates.
pub struct FrameDecoder {
    state: DecoderState,
    buffer: [u8; MAX_FRAME_SIZE],
    len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder { state: DecoderState::SearchFlag, buffer: [0; MAX_FRAME_SIZE], len: 0 }
    }

    /// Resets the parser to its initial, out-of-frame state. Used when the
    /// driver reopens a link.
    pub fn reset(&mut self) {
        self.state = DecoderState::SearchFlag;
        self.len = 0;
    }

    fn push(&mut self, byte: u8) -> bool {
        if self.len >= MAX_FRAME_SIZE {
            // Buffer overrun: drop the in-progress frame and resync.
            log::warn!("frame exceeded {} bytes, dropping and resyncing", MAX_FRAME_SIZE);
            self.len = 0;
            self.state = DecoderState::SearchFlag;
            return false;
        }
        self.buffer[self.len] = byte;
        self.len += 1;
        true
    }

    fn deliver<F: FnMut(FrameEvent)>(&mut self, mut on_frame: F) {
        if self.len < 3 {
            log::trace!("dropping frame of {} bytes, shorter than seq+payload+crc", self.len);
            on_frame(FrameEvent::Malformed);
        } else {
            let body_end = self.len - 2;
            let seq = self.buffer[0];
            let crc_hi = self.buffer[body_end];
            let crc_lo = self.buffer[body_end + 1];
            let received = ((crc_hi as u16) << 8) | crc_lo as u16;
            let computed = crc::compute(&self.buffer[..body_end]);
            let err = computed != received;
            if err {
                log::trace!("crc mismatch on seq {}: received {:#06x}, computed {:#06x}", seq, received, computed);
            }
            on_frame(FrameEvent::Frame { seq, payload: &self.buffer[1..body_end], err });
        }
        self.len = 0;
    }

    /// Feeds one byte of the incoming stream. Returns `false` if this byte
    /// caused a buffer overrun (the in-progress frame was dropped); `true`
    /// otherwise, including when a frame was just delivered.
    pub fn feed<F: FnMut(FrameEvent)>(&mut self, byte: u8, mut on_frame: F) -> bool {
        match self.state {
            DecoderState::SearchFlag => {
                if byte == FLAG {
                    self.state = DecoderState::InFrame;
                    self.len = 0;
                }
                true
            }
            DecoderState::InFrame => {
                if byte == FLAG {
                    if self.len != 0 {
                        self.deliver(&mut on_frame);
                    }
                    // Consecutive flags collapse to nothing; this flag also
                    // serves as the opening flag of the next frame.
                    true
                } else if byte == ESC {
                    self.state = DecoderState::Escaped;
                    true
                } else {
                    self.push(byte)
                }
            }
            DecoderState::Escaped => {
                self.state = DecoderState::InFrame;
                self.push(byte ^ ESC_XOR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MAX_PAYLOAD_SIZE;

    fn encode(seq: u8, payload: &[u8]) -> std::vec::Vec<u8> {
        let mut sink = std::vec::Vec::new();
        let mut enc = FrameEncoder::new();
        enc.begin(seq, 0, &mut sink).unwrap();
        enc.write_bytes(payload, &mut sink).unwrap();
        enc.end(&mut sink).unwrap();
        sink
    }

    fn decode_one(bytes: &[u8]) -> Option<(u8, std::vec::Vec<u8>, bool)> {
        let mut dec = FrameDecoder::new();
        let mut result = None;
        for &b in bytes {
            dec.feed(b, |ev| {
                if let FrameEvent::Frame { seq, payload, err } = ev {
                    result = Some((seq, payload.to_vec(), err));
                }
            });
        }
        result
    }

    #[test]
    fn round_trips_a_simple_frame() {
        let bytes = encode(1, &[0x00]);
        let (seq, payload, err) = decode_one(&bytes).expect("frame delivered");
        assert_eq!(seq, 1);
        assert_eq!(payload, vec![0x00]);
        assert!(!err);
    }

    #[test]
    fn stuffs_flag_and_escape_bytes() {
        let bytes = encode(0x7E, &[0x7D, 0x7E, 0x01]);
        // Everything between the opening and closing flag must be either a
        // literal non-special byte or an ESC,(byte^ESC_XOR) pair.
        let body = &bytes[1..bytes.len() - 1];
        let mut i = 0;
        while i < body.len() {
            if body[i] == ESC {
                assert!(i + 1 < body.len());
                assert!(body[i + 1] == 0x5D || body[i + 1] == 0x5E);
                i += 2;
            } else {
                assert_ne!(body[i], FLAG);
                i += 1;
            }
        }
        let (seq, payload, err) = decode_one(&bytes).expect("frame delivered");
        assert_eq!(seq, 0x7E);
        assert_eq!(payload, vec![0x7D, 0x7E, 0x01]);
        assert!(!err);
    }

    #[test]
    fn detects_single_bit_flip() {
        let mut bytes = encode(5, &[0x01, 0x02, 0x03]);
        // Flip a low bit in a byte that is not part of a flag/escape pair.
        let target = bytes.len() / 2;
        bytes[target] ^= 0x01;
        let (_, _, err) = decode_one(&bytes).expect("frame still delivered, just with err set");
        assert!(err);
    }

    #[test]
    fn consecutive_flags_are_collapsed() {
        let mut seen = 0;
        let mut dec = FrameDecoder::new();
        for b in [FLAG, FLAG, FLAG] {
            dec.feed(b, |_| seen += 1);
        }
        assert_eq!(seen, 0);
    }

    #[test]
    fn max_payload_round_trips() {
        let payload = vec![0xAAu8; MAX_PAYLOAD_SIZE];
        let bytes = encode(9, &payload);
        let (_, decoded, err) = decode_one(&bytes).expect("frame delivered");
        assert_eq!(decoded, payload);
        assert!(!err);
    }

    #[test]
    fn truncated_frame_is_malformed() {
        let mut dec = FrameDecoder::new();
        let mut malformed = false;
        for b in [FLAG, 0x01, FLAG] {
            dec.feed(b, |ev| {
                if matches!(ev, FrameEvent::Malformed) {
                    malformed = true;
                }
            });
        }
        assert!(malformed);
    }
}
