//! The closed catalog of request, response and interrupt kinds, and the
//! handful of wire-level constants that govern them.

/// Protocol version exchanged during `GET_PROTOCOL_VERSION`. Bumping this is
/// the only negotiation the wire format supports.
pub const PROTOCOL_VERSION: u16 = 0x0100;

/// Fixed serial parameters: 115200 Bd, 8 data bits, no parity, 1 stop bit, no
/// flow control.
pub const BAUD_RATE: u32 = 115_200;

/// Frame delimiter.
pub const FLAG: u8 = 0x7E;
/// Escape byte used by byte-stuffing.
pub const ESC: u8 = 0x7D;
/// XOR mask applied to an escaped byte.
pub const ESC_XOR: u8 = 0x20;

/// Largest unstuffed frame (sequence + payload + 2-byte CRC) the codec will
/// ever produce or accept.
pub const MAX_FRAME_SIZE: usize = 256;
/// Largest payload a single frame can carry (`MAX_FRAME_SIZE` minus the
/// sequence byte and the 2-byte trailing CRC).
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - 3;

/// Minimum request-queue depth a conforming host driver must support.
pub const MIN_QUEUE_CAPACITY: usize = 64;

/// Sentinel USB HID keycode meaning "no key" / "no event". Callbacks that
/// remap a key or button return this to cancel the event.
pub const NO_EVENT: u8 = 0x00;

/// Mouse button bitmask positions.
pub mod mouse_button {
    pub const LEFT: u8 = 0x01;
    pub const RIGHT: u8 = 0x02;
    pub const MIDDLE: u8 = 0x04;
}

/// Values carried by `GET_USB_STATE` and `I_USB_STATE_UPDATE`, mirroring the
/// USB 2.0 device state model (detached, attached-but-unconfigured,
/// configured, suspended). `is_fully_connected()` on the host side checks
/// for `CONFIGURED`.
pub mod usb_state {
    pub const DETACHED: u8 = 0x00;
    pub const ATTACHED: u8 = 0x01;
    pub const CONFIGURED: u8 = 0x02;
    pub const SUSPENDED: u8 = 0x03;
}

/// The closed set of host-to-periphery request kinds. The discriminant is
/// the byte transmitted as the first payload byte of the request frame; it
/// is stable wire format, never renumber these.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum RequestKind {
    GetProtocolVersion = 0x00,
    GetAlive = 0x01,
    GetUsbState = 0x02,
    GetKeyboardLeds = 0x03,
    SetKeyboardDown = 0x04,
    SetKeyboardUp = 0x05,
    SetKeyboardAllUp = 0x06,
    SetKeyboardPush = 0x07,
    SetKeyboardWrite = 0x08,
    SetMouseButtonDown = 0x09,
    SetMouseButtonUp = 0x0A,
    SetMouseButtonAllUp = 0x0B,
    SetMouseButtonPush = 0x0C,
    SetMouseMoveAbs = 0x0D,
    SetMouseMoveRel = 0x0E,
    SetMouseScroll = 0x0F,
}

impl RequestKind {
    pub const COUNT: usize = 16;

    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::GetProtocolVersion,
            0x01 => Self::GetAlive,
            0x02 => Self::GetUsbState,
            0x03 => Self::GetKeyboardLeds,
            0x04 => Self::SetKeyboardDown,
            0x05 => Self::SetKeyboardUp,
            0x06 => Self::SetKeyboardAllUp,
            0x07 => Self::SetKeyboardPush,
            0x08 => Self::SetKeyboardWrite,
            0x09 => Self::SetMouseButtonDown,
            0x0A => Self::SetMouseButtonUp,
            0x0B => Self::SetMouseButtonAllUp,
            0x0C => Self::SetMouseButtonPush,
            0x0D => Self::SetMouseMoveAbs,
            0x0E => Self::SetMouseMoveRel,
            0x0F => Self::SetMouseScroll,
            _ => return None,
        })
    }
}

/// Interrupt sub-kind: an unsolicited, sequence-0 frame from the periphery.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum InterruptKind {
    UsbStateUpdate = 0x40,
    LedUpdate = 0x41,
}

impl InterruptKind {
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x40 => Self::UsbStateUpdate,
            0x41 => Self::LedUpdate,
            _ => return None,
        })
    }
}

/// Protocol-layer error kind, the payload of an `>= 0x80` response byte.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum ErrorKind {
    BrokenFrame = 0x80,
    UnsupportedReqType = 0x81,
    InvalidReqType = 0x82,
    InvalidFieldValue = 0x83,
    HostWriteError = 0x84,
}

impl ErrorKind {
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x80 => Self::BrokenFrame,
            0x81 => Self::UnsupportedReqType,
            0x82 => Self::InvalidReqType,
            0x83 => Self::InvalidFieldValue,
            0x84 => Self::HostWriteError,
            _ => return None,
        })
    }
}

/// The decoded shape of a response frame's first payload byte: success,
/// interrupt, ignored debug/trace, or protocol error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResponseKind {
    Ok,
    Interrupt(InterruptKind),
    /// `0x60..=0x7F`: debug/trace, ignored by the host beyond diagnostics.
    Debug(u8),
    Error(ErrorKind),
}

impl ResponseKind {
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            0x00..=0x3F => ResponseKind::Ok,
            0x40..=0x5F => match InterruptKind::from_u8(byte) {
                Some(kind) => ResponseKind::Interrupt(kind),
                // reserved interrupt range, not (yet) one of the two known kinds
                None => ResponseKind::Debug(byte),
            },
            0x60..=0x7F => ResponseKind::Debug(byte),
            _ => match ErrorKind::from_u8(byte) {
                Some(kind) => ResponseKind::Error(kind),
                None => ResponseKind::Error(ErrorKind::InvalidReqType),
            },
        }
    }
}

/// Surface-level outcome of a single request, as delivered to a callback.
/// This is the "request-result plane": it never terminates the session.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PeripheryResult {
    Ok,
    BrokenFrame,
    UnsupportedReqType,
    InvalidReqType,
    InvalidFieldValue,
    HostWriteError,
}

impl From<ErrorKind> for PeripheryResult {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::BrokenFrame => PeripheryResult::BrokenFrame,
            ErrorKind::UnsupportedReqType => PeripheryResult::UnsupportedReqType,
            ErrorKind::InvalidReqType => PeripheryResult::InvalidReqType,
            ErrorKind::InvalidFieldValue => PeripheryResult::InvalidFieldValue,
            ErrorKind::HostWriteError => PeripheryResult::HostWriteError,
        }
    }
}

/// Why the transport-plane session ended. Delivered exactly once via
/// `on_disconnected`; terminates the session (unlike `PeripheryResult`).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DisconnectReason {
    User,
    RecvError,
    SendError,
    InvalidProtocol,
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_kind_round_trips_through_all_ordinals() {
        for byte in 0..RequestKind::COUNT as u8 {
            let kind = RequestKind::from_u8(byte).expect("ordinal in range must decode");
            assert_eq!(kind.to_u8(), byte);
        }
        assert!(RequestKind::from_u8(RequestKind::COUNT as u8).is_none());
    }

    #[test]
    fn response_kind_classifies_ranges() {
        assert_eq!(ResponseKind::from_u8(0x00), ResponseKind::Ok);
        assert_eq!(ResponseKind::from_u8(0x3F), ResponseKind::Ok);
        assert_eq!(ResponseKind::from_u8(0x40), ResponseKind::Interrupt(InterruptKind::UsbStateUpdate));
        assert_eq!(ResponseKind::from_u8(0x41), ResponseKind::Interrupt(InterruptKind::LedUpdate));
        assert_eq!(ResponseKind::from_u8(0x6A), ResponseKind::Debug(0x6A));
        assert_eq!(ResponseKind::from_u8(0x80), ResponseKind::Error(ErrorKind::BrokenFrame));
        assert_eq!(ResponseKind::from_u8(0x84), ResponseKind::Error(ErrorKind::HostWriteError));
    }
}
