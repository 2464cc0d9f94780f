//! Ties a platform [`CaptureBackend`][crate::backend::CaptureBackend] to a
//! [`VkvmDriver`], translating OS events into wire requests. This is the
//! crate's one stateful entry point; everything else here is a pure
//! translation table or a small accumulator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use vkvm_host::callbacks::RemapAction;
use vkvm_host::driver::VkvmDriver;
use vkvm_protocol::hidkeys;

use crate::backend::{CaptureBackend, InputEvent};
use crate::coalesce::MotionCoalescer;
use crate::error::InputError;
use crate::platform::{self, ActiveBackend};

/// Lets the hook ask its owner whether a key or button should be remapped or
/// suppressed before it reaches the wire, without requiring the owner to
/// also implement [`vkvm_host::callbacks::VkvmCallbacks`] — capture and the
/// driver's response callbacks are independent concerns.
pub trait RemapPolicy: Send + Sync {
    fn remap_key(&self, key: u8, os_key: u32, action: RemapAction) -> u8 {
        let _ = (os_key, action);
        key
    }

    fn remap_button(&self, button: u8, action: RemapAction) -> u8 {
        let _ = action;
        button
    }
}

/// Accepts every event unmodified; the default when a caller has no remap
/// rules of its own.
pub struct NoRemap;

impl RemapPolicy for NoRemap {}

struct Shared {
    driver: VkvmDriver,
    policy: Box<dyn RemapPolicy>,
    coalescer: Mutex<MotionCoalescer>,
}

/// Owns exclusive OS-level input capture and forwards it to a
/// [`VkvmDriver`]. Enabling capture grabs the keyboard and mouse from the
/// local desktop; disabling it releases them. Both transitions honor the
/// release-sequence invariant: before the hook hands control back to either
/// side, neither side may be left with a key or button believed held that
/// the other side no longer agrees is held.
pub struct InputHook {
    backend: Mutex<ActiveBackend>,
    shared: Arc<Shared>,
    enabled: AtomicBool,
}

impl InputHook {
    pub fn new(driver: VkvmDriver) -> Self {
        Self::with_policy(driver, Box::new(NoRemap))
    }

    pub fn with_policy(driver: VkvmDriver, policy: Box<dyn RemapPolicy>) -> Self {
        InputHook {
            backend: Mutex::new(ActiveBackend::default()),
            shared: Arc::new(Shared { driver, policy, coalescer: Mutex::new(MotionCoalescer::new()) }),
            enabled: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Releases all remote keys and mouse buttons, then grabs local input.
    /// Grabbing after the remote release (rather than before) means a
    /// periphery that was mid-keypress when capture turns on never ends up
    /// holding a key the new capture session doesn't know about.
    pub fn enable(&self) -> Result<(), InputError> {
        if self.enabled.swap(true, Ordering::SeqCst) {
            return Err(InputError::AlreadyEnabled);
        }
        let _ = self.shared.driver.keyboard_all_up();
        let _ = self.shared.driver.mouse_button_all_up();
        self.shared.coalescer.lock().unwrap().reset();

        let shared = self.shared.clone();
        let sink: crate::backend::EventSink = Arc::new(move |event| shared.clone().dispatch(event));
        let mut backend = self.backend.lock().unwrap();
        if let Err(err) = backend.grab(sink) {
            self.enabled.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    /// Ungrabs local input first, then tells the remote side every key and
    /// button is up — the mirror image of [`InputHook::enable`], so a host
    /// crash between the two steps never leaves the periphery believing a
    /// key is held that the local OS has already released.
    pub fn disable(&self) -> Result<(), InputError> {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return Err(InputError::AlreadyDisabled);
        }
        let result = self.backend.lock().unwrap().ungrab();
        let _ = self.shared.driver.keyboard_all_up();
        let _ = self.shared.driver.mouse_button_all_up();
        self.shared.coalescer.lock().unwrap().reset();
        result
    }
}

impl Shared {
    fn dispatch(self: Arc<Self>, event: InputEvent) {
        match event {
            InputEvent::Key { os_code, down } => {
                let hid = platform::key_to_hid(os_code);
                if hid == hidkeys::NO_EVENT {
                    return;
                }
                let action = if down { RemapAction::Down } else { RemapAction::Up };
                let mapped = self.policy.remap_key(hid, os_code, action);
                if mapped == hidkeys::NO_EVENT {
                    return;
                }
                let keys = [mapped];
                let _ = if down { self.driver.keyboard_down(&keys) } else { self.driver.keyboard_up(&keys) };
            }
            InputEvent::MouseButton { os_code, down } => {
                let hid = platform::button_to_hid(os_code);
                if hid == 0 {
                    return;
                }
                let action = if down { RemapAction::Down } else { RemapAction::Up };
                let mapped = self.policy.remap_button(hid, action);
                if mapped == 0 {
                    return;
                }
                let buttons = [mapped];
                let _ = if down { self.driver.mouse_button_down(&buttons) } else { self.driver.mouse_button_up(&buttons) };
            }
            InputEvent::MouseMoveRel { dx, dy } => {
                let mut coalescer = self.coalescer.lock().unwrap();
                coalescer.add_motion(dx, dy);
                while let Some((chunk_dx, chunk_dy)) = coalescer.drain_motion() {
                    let _ = self.driver.mouse_move_rel(chunk_dx, chunk_dy);
                }
            }
            InputEvent::MouseMoveAbs { x, y, max_x, max_y } => {
                let scaled_x = scale_to_wire(x, max_x);
                let scaled_y = scale_to_wire(y, max_y);
                let _ = self.driver.mouse_move_abs(scaled_x, scaled_y);
            }
            InputEvent::MouseScroll { delta } => {
                let mut coalescer = self.coalescer.lock().unwrap();
                coalescer.add_wheel(delta);
                while let Some(chunk) = coalescer.drain_wheel() {
                    let _ = self.driver.mouse_scroll(chunk);
                }
            }
        }
    }
}

/// Scales an OS-reported absolute coordinate (0..=max) onto the wire's
/// `i16` range, clamping rather than wrapping on out-of-range input.
fn scale_to_wire(value: i32, max: i32) -> i16 {
    if max <= 0 {
        return 0;
    }
    let scaled = (value as i64 * i16::MAX as i64) / max as i64;
    scaled.clamp(0, i16::MAX as i64) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_to_wire_clamps_at_the_reported_maximum() {
        assert_eq!(scale_to_wire(0, 1000), 0);
        assert_eq!(scale_to_wire(1000, 1000), i16::MAX);
        assert_eq!(scale_to_wire(500, 0), 0);
    }
}
