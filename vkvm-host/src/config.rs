//! Driver configuration. There is no on-disk configuration file: the serial
//! path and the timeout/tick pair are the only knobs, and both are supplied
//! to [`crate::driver::VkvmDriver::open`].

/// Default keep-alive / pending-request timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
/// Default reader poll tick, in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 100;

/// Parameters for one `open()` call.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub path: String,
    pub baud: u32,
    pub timeout_ms: u64,
    pub tick_ms: u64,
}

impl DriverConfig {
    /// A config with the protocol's fixed baud rate and the default
    /// timeout/tick pair, for the given serial device path.
    pub fn new(path: impl Into<String>) -> Self {
        DriverConfig {
            path: path.into(),
            baud: vkvm_protocol::catalog::BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            tick_ms: DEFAULT_TICK_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.tick_ms = tick_ms;
        self
    }

    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }
}
