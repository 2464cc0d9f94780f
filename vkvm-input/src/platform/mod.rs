//! Selects the capture backend and scancode translation tables for the
//! current target, mirroring the teacher's `llio_hosted.rs` / `llio_hw.rs`
//! split: one API (`ActiveBackend`, `key_to_hid`, `button_to_hid`), multiple
//! `cfg`-gated implementations behind it.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::{button_to_hid, key_to_hid, LinuxBackend as ActiveBackend};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::{button_to_hid, key_to_hid, WindowsBackend as ActiveBackend};

#[cfg(not(any(target_os = "linux", windows)))]
mod stub;
#[cfg(not(any(target_os = "linux", windows)))]
pub use stub::{button_to_hid, key_to_hid, StubBackend as ActiveBackend};
