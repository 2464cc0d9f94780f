//! End-to-end checks that exercise the encoder and decoder together, plus
//! the request/response catalog glue, the way a real link would.

use vkvm_protocol::catalog::{ErrorKind, InterruptKind, RequestKind, ResponseKind};
use vkvm_protocol::codec::{FrameDecoder, FrameEncoder, FrameEvent};

fn encode_request(seq: u8, kind: RequestKind, fields: &[u8]) -> Vec<u8> {
    let mut sink = Vec::new();
    let mut enc = FrameEncoder::new();
    enc.begin(seq, 0, &mut sink).unwrap();
    enc.write_u8(kind.to_u8(), &mut sink).unwrap();
    enc.write_bytes(fields, &mut sink).unwrap();
    enc.end(&mut sink).unwrap();
    sink
}

fn decode_all(bytes: &[u8]) -> Vec<(u8, Vec<u8>, bool)> {
    let mut dec = FrameDecoder::new();
    let mut frames = Vec::new();
    for &b in bytes {
        dec.feed(b, |ev| {
            if let FrameEvent::Frame { seq, payload, err } = ev {
                frames.push((seq, payload.to_vec(), err));
            }
        });
    }
    frames
}

#[test]
fn a_request_frame_round_trips_with_its_request_kind_intact() {
    let bytes = encode_request(3, RequestKind::SetMouseMoveRel, &[0x01, 0xFE, 0x00, 0x02]);
    let frames = decode_all(&bytes);
    assert_eq!(frames.len(), 1);
    let (seq, payload, err) = &frames[0];
    assert_eq!(*seq, 3);
    assert!(!err);
    let kind = RequestKind::from_u8(payload[0]).expect("known request kind");
    assert_eq!(kind, RequestKind::SetMouseMoveRel);
    assert_eq!(&payload[1..], &[0x01, 0xFE, 0x00, 0x02]);
}

#[test]
fn back_to_back_frames_on_one_continuous_stream_all_decode() {
    let mut stream = Vec::new();
    let mut enc = FrameEncoder::new();
    for seq in 1..=5u8 {
        enc.begin(seq, (seq as u64) * 10, &mut stream).unwrap();
        enc.write_u8(RequestKind::GetAlive.to_u8(), &mut stream).unwrap();
        enc.end(&mut stream).unwrap();
    }
    let frames = decode_all(&stream);
    assert_eq!(frames.len(), 5);
    for (i, (seq, payload, err)) in frames.iter().enumerate() {
        assert_eq!(*seq, (i + 1) as u8);
        assert_eq!(payload[0], RequestKind::GetAlive.to_u8());
        assert!(!err);
    }
}

#[test]
fn idle_gap_inserts_a_fresh_leading_flag_but_still_decodes() {
    let mut stream = Vec::new();
    let mut enc = FrameEncoder::new();
    enc.begin(1, 0, &mut stream).unwrap();
    enc.write_u8(RequestKind::GetProtocolVersion.to_u8(), &mut stream).unwrap();
    enc.end(&mut stream).unwrap();

    // Well past the idle-resync threshold.
    enc.begin(2, 5_000, &mut stream).unwrap();
    enc.write_u8(RequestKind::GetUsbState.to_u8(), &mut stream).unwrap();
    enc.end(&mut stream).unwrap();

    let frames = decode_all(&stream);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].0, 2);
}

#[test]
fn response_byte_classification_matches_the_request_response_pairing() {
    // A periphery would answer GetKeyboardLeds with a plain Ok-range byte
    // followed by the LED bitmask; an out-of-range request type gets an
    // error-range byte back.
    assert_eq!(ResponseKind::from_u8(0x00), ResponseKind::Ok);
    assert_eq!(ResponseKind::from_u8(0x81), ResponseKind::Error(ErrorKind::UnsupportedReqType));
    assert_eq!(ResponseKind::from_u8(0x41), ResponseKind::Interrupt(InterruptKind::LedUpdate));
}

#[test]
fn a_corrupted_frame_is_still_delivered_but_flagged() {
    let mut bytes = encode_request(7, RequestKind::SetKeyboardDown, &[0x04]);
    // Corrupt a payload byte without touching either flag byte.
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    let frames = decode_all(&bytes);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].2, "corrupted payload must set err");
}
