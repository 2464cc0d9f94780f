//! Windows capture backend: a pair of low-level hooks (`WH_KEYBOARD_LL`,
//! `WH_MOUSE_LL`) that swallow every event (return non-zero instead of
//! calling `CallNextHookEx`) while capture is enabled, run on a dedicated
//! thread with its own message loop since `SetWindowsHookEx` hooks only
//! live as long as the installing thread keeps pumping messages.

use std::sync::{Mutex, OnceLock};
use std::thread::JoinHandle;

use windows_sys::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW, SetWindowsHookExW,
    TranslateMessage, UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, MSG, MSLLHOOKSTRUCT,
    WH_KEYBOARD_LL, WH_MOUSE_LL, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN, WM_LBUTTONUP,
    WM_MBUTTONDOWN, WM_MBUTTONUP, WM_MOUSEMOVE, WM_MOUSEWHEEL, WM_QUIT, WM_RBUTTONDOWN,
    WM_RBUTTONUP, WM_SYSKEYDOWN, WM_SYSKEYUP,
};

use crate::backend::{CaptureBackend, EventSink, InputEvent};
use crate::error::InputError;

/// Virtual-key codes for the three mouse buttons the protocol knows about,
/// used only to shape the `InputEvent::MouseButton` we hand to the hook —
/// the wire bitmask mapping lives in [`button_to_hid`].
const VK_BUTTON_LEFT: u32 = 1;
const VK_BUTTON_RIGHT: u32 = 2;
const VK_BUTTON_MIDDLE: u32 = 4;

static SINK: OnceLock<Mutex<Option<EventSink>>> = OnceLock::new();

fn sink_slot() -> &'static Mutex<Option<EventSink>> {
    SINK.get_or_init(|| Mutex::new(None))
}

fn emit(event: InputEvent) {
    if let Some(sink) = sink_slot().lock().unwrap().as_ref() {
        sink(event);
    }
}

/// Windows virtual-key code → USB HID keycode, covering the keys a VKVM
/// session actually needs to forward (letters, digits, function keys,
/// navigation, and the eight modifier keys split left/right via the
/// `KBDLLHOOKSTRUCT.flags` extended bit, handled by the caller).
pub const fn key_to_hid(vk: u32) -> u8 {
    use vkvm_protocol::hidkeys as hid;
    match vk {
        0x08 => hid::BACKSPACE,
        0x09 => hid::TAB,
        0x0D => hid::ENTER,
        0x1B => hid::ESCAPE,
        0x20 => hid::SPACE,
        0x21 => hid::PAGE_UP,
        0x22 => hid::PAGE_DOWN,
        0x23 => hid::END,
        0x24 => hid::HOME,
        0x25 => hid::LEFT_ARROW,
        0x26 => hid::UP_ARROW,
        0x27 => hid::RIGHT_ARROW,
        0x28 => hid::DOWN_ARROW,
        0x2C => hid::PRINT_SCREEN,
        0x2D => hid::INSERT,
        0x2E => hid::DELETE,
        0x30 => hid::DIGIT0,
        0x31 => hid::DIGIT1,
        0x32 => hid::DIGIT2,
        0x33 => hid::DIGIT3,
        0x34 => hid::DIGIT4,
        0x35 => hid::DIGIT5,
        0x36 => hid::DIGIT6,
        0x37 => hid::DIGIT7,
        0x38 => hid::DIGIT8,
        0x39 => hid::DIGIT9,
        0x41 => hid::A,
        0x42 => hid::B,
        0x43 => hid::C,
        0x44 => hid::D,
        0x45 => hid::E,
        0x46 => hid::F,
        0x47 => hid::G,
        0x48 => hid::H,
        0x49 => hid::I,
        0x4A => hid::J,
        0x4B => hid::K,
        0x4C => hid::L,
        0x4D => hid::M,
        0x4E => hid::N,
        0x4F => hid::O,
        0x50 => hid::P,
        0x51 => hid::Q,
        0x52 => hid::R,
        0x53 => hid::S,
        0x54 => hid::T,
        0x55 => hid::U,
        0x56 => hid::V,
        0x57 => hid::W,
        0x58 => hid::X,
        0x59 => hid::Y,
        0x5A => hid::Z,
        0x5B => hid::LEFT_GUI,
        0x5C => hid::RIGHT_GUI,
        0x6A => hid::KP_MULTIPLY,
        0x6B => hid::KP_ADD,
        0x6D => hid::KP_SUBTRACT,
        0x6E => hid::KP_DECIMAL,
        0x6F => hid::KP_DIVIDE,
        0x70 => hid::F1,
        0x71 => hid::F2,
        0x72 => hid::F3,
        0x73 => hid::F4,
        0x74 => hid::F5,
        0x75 => hid::F6,
        0x76 => hid::F7,
        0x77 => hid::F8,
        0x78 => hid::F9,
        0x79 => hid::F10,
        0x7A => hid::F11,
        0x7B => hid::F12,
        0x90 => hid::NUM_LOCK,
        0x91 => hid::SCROLL_LOCK,
        0xA0 => hid::LEFT_SHIFT,
        0xA1 => hid::RIGHT_SHIFT,
        0xA2 => hid::LEFT_CONTROL,
        0xA3 => hid::RIGHT_CONTROL,
        0xA4 => hid::LEFT_ALT,
        0xA5 => hid::RIGHT_ALT,
        0xBA => hid::SEMICOLON,
        0xBB => hid::EQUAL,
        0xBC => hid::COMMA,
        0xBD => hid::MINUS,
        0xBE => hid::PERIOD,
        0xBF => hid::SLASH,
        0xC0 => hid::ACCENT,
        0xDB => hid::OPEN_BRACKET,
        0xDC => hid::BACKSLASH,
        0xDD => hid::CLOSE_BRACKET,
        0xDE => hid::APOSTROPHE,
        _ => hid::NO_EVENT,
    }
}

pub const fn button_to_hid(os_code: u32) -> u8 {
    use vkvm_protocol::catalog::mouse_button as btn;
    match os_code {
        VK_BUTTON_LEFT => btn::LEFT,
        VK_BUTTON_RIGHT => btn::RIGHT,
        VK_BUTTON_MIDDLE => btn::MIDDLE,
        _ => 0x00,
    }
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let data = &*(lparam as *const KBDLLHOOKSTRUCT);
        let down = matches!(wparam as u32, WM_KEYDOWN | WM_SYSKEYDOWN);
        let up = matches!(wparam as u32, WM_KEYUP | WM_SYSKEYUP);
        if down || up {
            // Windows reports VK_LSHIFT/VK_RSHIFT directly rather than the
            // generic VK_SHIFT, so no left/right disambiguation is needed here.
            emit(InputEvent::Key { os_code: data.vkCode, down });
        }
        return 1;
    }
    CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam)
}

unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let data = &*(lparam as *const MSLLHOOKSTRUCT);
        match wparam as u32 {
            WM_MOUSEMOVE => emit(InputEvent::MouseMoveAbs { x: data.pt.x, y: data.pt.y, max_x: i32::MAX, max_y: i32::MAX }),
            WM_LBUTTONDOWN => emit(InputEvent::MouseButton { os_code: VK_BUTTON_LEFT, down: true }),
            WM_LBUTTONUP => emit(InputEvent::MouseButton { os_code: VK_BUTTON_LEFT, down: false }),
            WM_RBUTTONDOWN => emit(InputEvent::MouseButton { os_code: VK_BUTTON_RIGHT, down: true }),
            WM_RBUTTONUP => emit(InputEvent::MouseButton { os_code: VK_BUTTON_RIGHT, down: false }),
            WM_MBUTTONDOWN => emit(InputEvent::MouseButton { os_code: VK_BUTTON_MIDDLE, down: true }),
            WM_MBUTTONUP => emit(InputEvent::MouseButton { os_code: VK_BUTTON_MIDDLE, down: false }),
            WM_MOUSEWHEEL => {
                let wheel_delta = ((data.mouseData >> 16) & 0xFFFF) as i16;
                emit(InputEvent::MouseScroll { delta: (wheel_delta as i32) / 120 });
            }
            _ => {}
        }
        return 1;
    }
    CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam)
}

pub struct WindowsBackend {
    thread: Option<JoinHandle<()>>,
    thread_id: Option<u32>,
}

impl WindowsBackend {
    pub fn new() -> Self {
        WindowsBackend { thread: None, thread_id: None }
    }
}

impl Default for WindowsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for WindowsBackend {
    fn grab(&mut self, sink: EventSink) -> Result<(), InputError> {
        if self.thread.is_some() {
            return Err(InputError::Grab("capture thread already running".into()));
        }
        *sink_slot().lock().unwrap() = Some(sink);

        let (tx, rx) = std::sync::mpsc::channel::<u32>();
        let handle = std::thread::spawn(move || unsafe {
            let keyboard_hook: HHOOK = SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), std::ptr::null_mut(), 0);
            let mouse_hook: HHOOK = SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_proc), std::ptr::null_mut(), 0);
            let _ = tx.send(windows_sys::Win32::System::Threading::GetCurrentThreadId());

            let mut msg: MSG = std::mem::zeroed();
            while GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) > 0 {
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }

            if !keyboard_hook.is_null() {
                UnhookWindowsHookEx(keyboard_hook);
            }
            if !mouse_hook.is_null() {
                UnhookWindowsHookEx(mouse_hook);
            }
        });

        let thread_id = rx.recv().map_err(|_| InputError::Grab("hook thread exited before reporting its id".into()))?;
        self.thread_id = Some(thread_id);
        self.thread = Some(handle);
        Ok(())
    }

    fn ungrab(&mut self) -> Result<(), InputError> {
        if let Some(thread_id) = self.thread_id.take() {
            unsafe {
                PostThreadMessageW(thread_id, WM_QUIT, 0, 0);
            }
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        *sink_slot().lock().unwrap() = None;
        Ok(())
    }
}
