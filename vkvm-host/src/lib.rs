//! Host-side driver for the VKVM serial link: a bounded request queue, a
//! serial transport, and the reader/writer/disconnector concurrency harness
//! that turns a stream of bytes into typed callback events.

pub mod callbacks;
pub mod config;
pub mod driver;
pub mod error;
pub mod queue;
pub mod transport;

pub use callbacks::{RemapAction, VkvmCallbacks};
pub use config::DriverConfig;
pub use driver::{LifecycleState, VkvmDriver};
pub use error::{DriverError, OpenError};
