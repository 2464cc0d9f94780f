//! The seam between the hook's translation/coalescing logic and a
//! platform's native capture mechanism (evdev device grabs on Linux,
//! `SetWindowsHookEx` on Windows, a no-op stub elsewhere).

use std::sync::Arc;

use crate::error::InputError;

/// One OS-native input event, already demultiplexed from whatever
/// platform-specific struct delivered it but not yet translated to USB HID
/// codes — that happens in [`crate::hook::InputHook`] so the remap
/// callbacks see one consistent shape regardless of backend.
#[derive(Debug, Copy, Clone)]
pub enum InputEvent {
    Key { os_code: u32, down: bool },
    MouseButton { os_code: u32, down: bool },
    MouseMoveRel { dx: i32, dy: i32 },
    /// `max_x`/`max_y` are the device's reported logical maximum, used to
    /// scale into the wire's `0..32767` range.
    MouseMoveAbs { x: i32, y: i32, max_x: i32, max_y: i32 },
    MouseScroll { delta: i32 },
}

/// Callback the backend invokes for every native event once grabbed. Boxed
/// so the hook can close over its own state without the backend needing a
/// generic parameter.
pub type EventSink = Arc<dyn Fn(InputEvent) + Send + Sync>;

/// A platform's exclusive-capture mechanism. `grab` must not return until
/// capture is active; `ungrab` must release every resource `grab` acquired,
/// including restoring any local keyboard LED state the backend itself
/// changed (see the release-sequence invariant in the input hook's design).
pub trait CaptureBackend: Send {
    fn grab(&mut self, sink: EventSink) -> Result<(), InputError>;
    fn ungrab(&mut self) -> Result<(), InputError>;
}
