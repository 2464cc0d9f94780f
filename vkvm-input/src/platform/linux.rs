//! Linux capture backend: enumerate `/dev/input/event*` devices, release
//! every key locally before grabbing (the "no stuck keys" contract from the
//! input hook's design), and run one reader thread per grabbed device.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use evdev::{AbsoluteAxisType, Device, EventType, InputEventKind, RelativeAxisType};

use crate::backend::{CaptureBackend, EventSink};
use crate::error::InputError;

const BTN_LEFT: u16 = 0x110;
const BTN_RIGHT: u16 = 0x111;
const BTN_MIDDLE: u16 = 0x112;

/// Linux keyboard-scancode → USB HID keycode table, covering the common
/// ANSI/ISO layout keys from `linux/input-event-codes.h`. Unmapped codes
/// fall through to `NO_EVENT` and are silently dropped by the hook.
pub const fn key_to_hid(os_code: u32) -> u8 {
    use vkvm_protocol::hidkeys as hid;
    match os_code as u16 {
        1 => hid::ESCAPE,
        2 => hid::DIGIT1,
        3 => hid::DIGIT2,
        4 => hid::DIGIT3,
        5 => hid::DIGIT4,
        6 => hid::DIGIT5,
        7 => hid::DIGIT6,
        8 => hid::DIGIT7,
        9 => hid::DIGIT8,
        10 => hid::DIGIT9,
        11 => hid::DIGIT0,
        12 => hid::MINUS,
        13 => hid::EQUAL,
        14 => hid::BACKSPACE,
        15 => hid::TAB,
        16 => hid::Q,
        17 => hid::W,
        18 => hid::E,
        19 => hid::R,
        20 => hid::T,
        21 => hid::Y,
        22 => hid::U,
        23 => hid::I,
        24 => hid::O,
        25 => hid::P,
        26 => hid::OPEN_BRACKET,
        27 => hid::CLOSE_BRACKET,
        28 => hid::ENTER,
        29 => hid::LEFT_CONTROL,
        30 => hid::A,
        31 => hid::S,
        32 => hid::D,
        33 => hid::F,
        34 => hid::G,
        35 => hid::H,
        36 => hid::J,
        37 => hid::K,
        38 => hid::L,
        39 => hid::SEMICOLON,
        40 => hid::APOSTROPHE,
        41 => hid::ACCENT,
        42 => hid::LEFT_SHIFT,
        43 => hid::BACKSLASH,
        44 => hid::Z,
        45 => hid::X,
        46 => hid::C,
        47 => hid::V,
        48 => hid::B,
        49 => hid::N,
        50 => hid::M,
        51 => hid::COMMA,
        52 => hid::PERIOD,
        53 => hid::SLASH,
        54 => hid::RIGHT_SHIFT,
        55 => hid::KP_MULTIPLY,
        56 => hid::LEFT_ALT,
        57 => hid::SPACE,
        58 => hid::CAPS_LOCK,
        59 => hid::F1,
        60 => hid::F2,
        61 => hid::F3,
        62 => hid::F4,
        63 => hid::F5,
        64 => hid::F6,
        65 => hid::F7,
        66 => hid::F8,
        67 => hid::F9,
        68 => hid::F10,
        69 => hid::NUM_LOCK,
        70 => hid::SCROLL_LOCK,
        71 => hid::KP_7,
        72 => hid::KP_8,
        73 => hid::KP_9,
        74 => hid::KP_SUBTRACT,
        75 => hid::KP_4,
        76 => hid::KP_5,
        77 => hid::KP_6,
        78 => hid::KP_ADD,
        79 => hid::KP_1,
        80 => hid::KP_2,
        81 => hid::KP_3,
        82 => hid::KP_0,
        83 => hid::KP_DECIMAL,
        87 => hid::F11,
        88 => hid::F12,
        96 => hid::KP_ENTER,
        97 => hid::RIGHT_CONTROL,
        98 => hid::KP_DIVIDE,
        99 => hid::PRINT_SCREEN,
        100 => hid::RIGHT_ALT,
        102 => hid::HOME,
        103 => hid::UP_ARROW,
        104 => hid::PAGE_UP,
        105 => hid::LEFT_ARROW,
        106 => hid::RIGHT_ARROW,
        107 => hid::END,
        108 => hid::DOWN_ARROW,
        109 => hid::PAGE_DOWN,
        110 => hid::INSERT,
        111 => hid::DELETE,
        117 => hid::KP_EQUAL,
        119 => hid::PAUSE,
        125 => hid::LEFT_GUI,
        126 => hid::RIGHT_GUI,
        127 => hid::MENU,
        _ => hid::NO_EVENT,
    }
}

pub const fn button_to_hid(os_code: u32) -> u8 {
    use vkvm_protocol::catalog::mouse_button as btn;
    match os_code as u16 {
        BTN_LEFT => btn::LEFT,
        BTN_RIGHT => btn::RIGHT,
        BTN_MIDDLE => btn::MIDDLE,
        _ => 0x00,
    }
}

/// Releases every key currently held on `device` by synthesizing up-events,
/// so a grab never hands the remote side a key that was already down when
/// capture started.
fn release_all_keys(device: &mut Device, sink: &EventSink) {
    let Ok(keys) = device.get_key_state() else { return };
    for key in keys.iter() {
        let code = key.code() as u32;
        if button_to_hid(code) != 0 {
            sink(crate::backend::InputEvent::MouseButton { os_code: code, down: false });
        } else {
            sink(crate::backend::InputEvent::Key { os_code: code, down: false });
        }
    }
}

struct GrabbedDevice {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct LinuxBackend {
    grabbed: Vec<GrabbedDevice>,
}

impl LinuxBackend {
    pub fn new() -> Self {
        LinuxBackend { grabbed: Vec::new() }
    }
}

impl CaptureBackend for LinuxBackend {
    fn grab(&mut self, sink: EventSink) -> Result<(), InputError> {
        let devices = evdev::enumerate().map(|(_, dev)| dev).collect::<Vec<_>>();
        if devices.is_empty() {
            return Err(InputError::Enumerate("no input devices found under /dev/input".into()));
        }
        for mut device in devices {
            let supports_keys = device.supported_events().contains(EventType::KEY);
            let supports_pointer = device.supported_events().contains(EventType::RELATIVE)
                || device.supported_events().contains(EventType::ABSOLUTE);
            if !supports_keys && !supports_pointer {
                continue;
            }
            release_all_keys(&mut device, &sink);
            device.grab().map_err(|e| InputError::Grab(format!("{e}")))?;

            let stop = Arc::new(AtomicBool::new(false));
            let thread_stop = stop.clone();
            let thread_sink = sink.clone();
            let handle = std::thread::spawn(move || read_device_loop(device, thread_sink, thread_stop));
            self.grabbed.push(GrabbedDevice { stop, handle });
        }
        if self.grabbed.is_empty() {
            return Err(InputError::Enumerate("no keyboard or pointer devices to grab".into()));
        }
        Ok(())
    }

    fn ungrab(&mut self) -> Result<(), InputError> {
        for grabbed in self.grabbed.drain(..) {
            grabbed.stop.store(true, Ordering::SeqCst);
            let _ = grabbed.handle.join();
        }
        Ok(())
    }
}

fn read_device_loop(mut device: Device, sink: EventSink, stop: Arc<AtomicBool>) {
    let abs_max_x = device
        .get_absinfo()
        .ok()
        .and_then(|mut infos| infos.find(|(axis, _)| *axis == AbsoluteAxisType::ABS_X))
        .map(|(_, info)| info.maximum())
        .unwrap_or(32767);
    let abs_max_y = device
        .get_absinfo()
        .ok()
        .and_then(|mut infos| infos.find(|(axis, _)| *axis == AbsoluteAxisType::ABS_Y))
        .map(|(_, info)| info.maximum())
        .unwrap_or(32767);
    let mut pending_abs_x: Option<i32> = None;
    let mut pending_abs_y: Option<i32> = None;

    while !stop.load(Ordering::SeqCst) {
        let events = match device.fetch_events() {
            Ok(events) => events,
            Err(err) => {
                log::debug!("evdev read failed, stopping reader for this device: {err}");
                return;
            }
        };
        for ev in events {
            match ev.kind() {
                InputEventKind::Key(key) => {
                    let code = key.code() as u32;
                    let down = ev.value() != 0;
                    // evdev reports mouse buttons (BTN_LEFT and friends) through
                    // the same EV_KEY stream as keyboard keys; route by which
                    // translation table actually knows the code.
                    if button_to_hid(code) != 0 {
                        sink(crate::backend::InputEvent::MouseButton { os_code: code, down });
                    } else {
                        sink(crate::backend::InputEvent::Key { os_code: code, down });
                    }
                }
                InputEventKind::RelAxis(axis) => match axis {
                    RelativeAxisType::REL_X => sink(crate::backend::InputEvent::MouseMoveRel { dx: ev.value(), dy: 0 }),
                    RelativeAxisType::REL_Y => sink(crate::backend::InputEvent::MouseMoveRel { dx: 0, dy: ev.value() }),
                    RelativeAxisType::REL_WHEEL => sink(crate::backend::InputEvent::MouseScroll { delta: ev.value() }),
                    _ => {}
                },
                InputEventKind::AbsAxis(axis) => match axis {
                    AbsoluteAxisType::ABS_X => pending_abs_x = Some(ev.value()),
                    AbsoluteAxisType::ABS_Y => pending_abs_y = Some(ev.value()),
                    _ => {}
                },
                InputEventKind::Synchronization(_) => {
                    if let (Some(x), Some(y)) = (pending_abs_x.take(), pending_abs_y.take()) {
                        sink(crate::backend::InputEvent::MouseMoveAbs { x, y, max_x: abs_max_x, max_y: abs_max_y });
                    }
                }
                _ => {}
            }
        }
    }
}
