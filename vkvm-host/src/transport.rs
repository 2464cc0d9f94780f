//! Serial transport wrapper: a deadline-bounded read, a deadline-bounded
//! write, and a cancellation flag both share so a blocked reader/writer can
//! be woken by `close()` without waiting out a full tick.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vkvm_protocol::codec::ByteSink;

use crate::error::OpenError;

/// Shared by the reader and writer halves so either side, or `close()`, can
/// interrupt a poll loop promptly.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Opens a serial port at the protocol's fixed framing (8N1, no flow
/// control) with the given baud rate and read tick timeout. Retries while
/// the OS reports the port busy or timing out, up to `open_timeout`.
pub fn open(path: &str, baud: u32, tick: Duration, open_timeout: Duration) -> Result<Box<dyn serialport::SerialPort>, OpenError> {
    let deadline = std::time::Instant::now() + open_timeout;
    loop {
        let attempt = serialport::new(path, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(tick)
            .open();
        match attempt {
            Ok(port) => return Ok(port),
            Err(err) if matches!(err.kind, serialport::ErrorKind::Io(std::io::ErrorKind::TimedOut)) => {
                if std::time::Instant::now() >= deadline {
                    return Err(OpenError::Timeout);
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(err) => return Err(OpenError::Port(err)),
        }
    }
}

/// One byte at a time, feeding a [`vkvm_protocol::codec::FrameDecoder`].
/// Returns `Ok(n)` for the number of bytes actually read (0 on a timeout,
/// which is not an error on this transport), or the I/O error.
pub fn read_tick(port: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    match port.read(buf) {
        Ok(n) => Ok(n),
        Err(err) if err.kind() == std::io::ErrorKind::TimedOut => Ok(0),
        Err(err) => Err(err),
    }
}

/// Adapts a serial port's blocking `Write` half to the codec's [`ByteSink`].
/// A write failure is recorded and surfaced once the frame is finished
/// rather than propagated mid-frame, since `ByteSink::put` cannot return an
/// error type of its own.
pub struct PortSink<'a> {
    port: &'a mut dyn Write,
    pub failed: bool,
}

impl<'a> PortSink<'a> {
    pub fn new(port: &'a mut dyn Write) -> Self {
        PortSink { port, failed: false }
    }
}

impl<'a> ByteSink for PortSink<'a> {
    fn put(&mut self, byte: u8) -> bool {
        if self.failed {
            return false;
        }
        match self.port.write_all(&[byte]) {
            Ok(()) => true,
            Err(err) => {
                log::error!("serial write failed: {err}");
                self.failed = true;
                false
            }
        }
    }
}
