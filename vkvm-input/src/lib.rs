//! OS-wide keyboard and mouse capture for a VKVM host: grabs local input,
//! translates it to USB HID codes, and forwards it through a
//! [`vkvm_host::driver::VkvmDriver`]. Exists as a separate crate from
//! `vkvm-host` because capture is platform-specific and entirely optional —
//! a caller that only wants scripted `keyboard_write`/`mouse_move_abs` calls
//! has no reason to link `evdev` or `windows-sys`.

pub mod backend;
pub mod coalesce;
pub mod error;
pub mod hook;
mod platform;

pub use backend::{CaptureBackend, EventSink, InputEvent};
pub use coalesce::MotionCoalescer;
pub use error::InputError;
pub use hook::{InputHook, NoRemap, RemapPolicy};
