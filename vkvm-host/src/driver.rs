//! The host driver: lifecycle state machine, reader/writer/disconnector
//! tasks, request dispatch. Mirrors the embedded dispatcher of §4.7 from
//! the other end of the wire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use vkvm_protocol::catalog::{DisconnectReason, PeripheryResult, RequestKind, ResponseKind, PROTOCOL_VERSION};
use vkvm_protocol::codec::{FrameDecoder, FrameEncoder, FrameEvent};

use crate::callbacks::VkvmCallbacks;
use crate::config::DriverConfig;
use crate::error::{DriverError, OpenError};
use crate::queue::{InFlightRequest, RequestQueue, TimeoutCheck};
use crate::transport::{self, CancelToken, PortSink};

/// Position in the open/close lifecycle. `OpenUnverified` is the window
/// between port-open success and the first `GET_PROTOCOL_VERSION` reply.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LifecycleState {
    Closed,
    Opening,
    OpenUnverified,
    OpenConnected,
    Closing,
}

#[derive(Default)]
struct Threads {
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

struct Inner {
    state: Mutex<LifecycleState>,
    queue: RequestQueue,
    usb_state: Mutex<Option<u8>>,
    keyboard_leds: Mutex<Option<u8>>,
    cancel: CancelToken,
    disconnecting: AtomicBool,
    callbacks: Arc<dyn VkvmCallbacks>,
    config: Mutex<DriverConfig>,
    threads: Mutex<Threads>,
    start: Instant,
}

impl Inner {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn is_connected(&self) -> bool {
        matches!(*self.state.lock().unwrap(), LifecycleState::OpenConnected)
    }
}

/// The host-side driver for one serial link. Cheap to clone: internally
/// `Arc`-backed, so the reader/writer/disconnector threads can each hold a
/// handle back to shared state.
#[derive(Clone)]
pub struct VkvmDriver {
    inner: Arc<Inner>,
}

impl VkvmDriver {
    /// Constructs a driver bound to the given callback object. The link is
    /// not opened yet; call [`VkvmDriver::open`].
    pub fn new(callbacks: Arc<dyn VkvmCallbacks>) -> Self {
        VkvmDriver {
            inner: Arc::new(Inner {
                state: Mutex::new(LifecycleState::Closed),
                queue: RequestQueue::new(vkvm_protocol::catalog::MIN_QUEUE_CAPACITY),
                usb_state: Mutex::new(None),
                keyboard_leds: Mutex::new(None),
                cancel: CancelToken::new(),
                disconnecting: AtomicBool::new(false),
                callbacks,
                config: Mutex::new(DriverConfig::new("")),
                threads: Mutex::new(Threads::default()),
                start: Instant::now(),
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(*self.inner.state.lock().unwrap(), LifecycleState::Closed)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Connected AND the periphery's USB link to the far PC is configured.
    pub fn is_fully_connected(&self) -> bool {
        self.is_connected()
            && self.inner.usb_state.lock().unwrap().map(|s| s == vkvm_protocol::catalog::usb_state::CONFIGURED).unwrap_or(false)
    }

    pub fn usb_state(&self) -> Option<u8> {
        *self.inner.usb_state.lock().unwrap()
    }

    pub fn keyboard_leds(&self) -> Option<u8> {
        *self.inner.keyboard_leds.lock().unwrap()
    }

    /// The configuration passed to the most recent successful `open()`.
    pub fn config(&self) -> DriverConfig {
        self.inner.config.lock().unwrap().clone()
    }

    /// Opens the serial link, spawning the reader and writer tasks and
    /// enqueuing the initial `GET_PROTOCOL_VERSION` handshake. Returns once
    /// the tasks are spawned; does not wait for the handshake reply.
    pub fn open(&self, config: DriverConfig) -> bool {
        {
            let mut state = self.inner.state.lock().unwrap();
            if !matches!(*state, LifecycleState::Closed) {
                return false;
            }
            *state = LifecycleState::Opening;
        }

        let tick = Duration::from_millis(config.tick_ms);
        let timeout = Duration::from_millis(config.timeout_ms);
        let open_timeout = timeout.saturating_mul(3).max(Duration::from_millis(1000));

        let port = match transport::open(&config.path, config.baud, tick, open_timeout) {
            Ok(port) => port,
            Err(err) => {
                log::error!("failed to open {}: {err}", config.path);
                *self.inner.state.lock().unwrap() = LifecycleState::Closed;
                let reason = match err {
                    OpenError::Timeout => DisconnectReason::Timeout,
                    OpenError::Port(_) => DisconnectReason::SendError,
                };
                self.inner.callbacks.on_disconnected(reason);
                return false;
            }
        };
        let reader_port = match port.try_clone() {
            Ok(p) => p,
            Err(err) => {
                log::error!("failed to clone serial handle for {}: {err}", config.path);
                *self.inner.state.lock().unwrap() = LifecycleState::Closed;
                let reason = if matches!(err.kind, serialport::ErrorKind::Io(std::io::ErrorKind::TimedOut)) {
                    DisconnectReason::Timeout
                } else {
                    DisconnectReason::SendError
                };
                self.inner.callbacks.on_disconnected(reason);
                return false;
            }
        };

        *self.inner.config.lock().unwrap() = config;
        self.inner.queue.reset();
        self.inner.cancel.reset();
        *self.inner.usb_state.lock().unwrap() = None;
        *self.inner.keyboard_leds.lock().unwrap() = None;
        *self.inner.state.lock().unwrap() = LifecycleState::OpenUnverified;

        let writer_inner = self.inner.clone();
        let writer_handle = std::thread::spawn(move || writer_loop(writer_inner, port));

        let reader_inner = self.inner.clone();
        let reader_handle = std::thread::spawn(move || reader_loop(reader_inner, reader_port, tick, timeout));

        {
            let mut threads = self.inner.threads.lock().unwrap();
            threads.writer = Some(writer_handle);
            threads.reader = Some(reader_handle);
        }

        let _ = self.inner.queue.enqueue(RequestKind::GetProtocolVersion, Vec::new());
        true
    }

    /// Idempotent. Signals termination, joins the reader/writer tasks,
    /// drops the serial handle, and fires `on_disconnected(USER)` before
    /// returning. Returns `false` if the link was already closed or a
    /// disconnect was already underway.
    ///
    /// Callbacks run on the reader thread (see `callbacks.rs`), and the
    /// "cyclic call" case lets a callback call `close()` on its own stack.
    /// Joining the reader from the reader itself would deadlock, so when
    /// `close()` is invoked from the reader thread it hands teardown to a
    /// fresh thread, the same way `request_disconnect` does for the
    /// error paths, and returns without waiting for it to finish.
    pub fn close(&self) -> bool {
        if self
            .inner
            .disconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if matches!(*self.inner.state.lock().unwrap(), LifecycleState::Closed) {
            self.inner.disconnecting.store(false, Ordering::SeqCst);
            return false;
        }
        *self.inner.state.lock().unwrap() = LifecycleState::Closing;

        let called_from_reader = {
            let threads = self.inner.threads.lock().unwrap();
            threads.reader.as_ref().map(|handle| handle.thread().id()) == Some(std::thread::current().id())
        };
        if called_from_reader {
            let inner = self.inner.clone();
            std::thread::spawn(move || {
                teardown(&inner, DisconnectReason::User);
                inner.disconnecting.store(false, Ordering::SeqCst);
            });
        } else {
            teardown(&self.inner, DisconnectReason::User);
            self.inner.disconnecting.store(false, Ordering::SeqCst);
        }
        true
    }

    fn enqueue(&self, kind: RequestKind, fields: Vec<u8>) -> Result<(), DriverError> {
        if !self.is_open() {
            return Err(DriverError::NotOpen);
        }
        self.inner.queue.enqueue(kind, fields)?;
        Ok(())
    }

    pub fn keyboard_down(&self, keys: &[u8]) -> Result<(), DriverError> {
        self.enqueue(RequestKind::SetKeyboardDown, keys.to_vec())
    }

    pub fn keyboard_up(&self, keys: &[u8]) -> Result<(), DriverError> {
        self.enqueue(RequestKind::SetKeyboardUp, keys.to_vec())
    }

    pub fn keyboard_all_up(&self) -> Result<(), DriverError> {
        self.enqueue(RequestKind::SetKeyboardAllUp, Vec::new())
    }

    pub fn keyboard_push(&self, keys: &[u8]) -> Result<(), DriverError> {
        self.enqueue(RequestKind::SetKeyboardPush, keys.to_vec())
    }

    pub fn keyboard_write(&self, modifier: u8, keys: &[u8]) -> Result<(), DriverError> {
        let mut fields = Vec::with_capacity(keys.len() + 1);
        fields.push(modifier);
        fields.extend_from_slice(keys);
        self.enqueue(RequestKind::SetKeyboardWrite, fields)
    }

    pub fn mouse_button_down(&self, buttons: &[u8]) -> Result<(), DriverError> {
        self.enqueue(RequestKind::SetMouseButtonDown, buttons.to_vec())
    }

    pub fn mouse_button_up(&self, buttons: &[u8]) -> Result<(), DriverError> {
        self.enqueue(RequestKind::SetMouseButtonUp, buttons.to_vec())
    }

    pub fn mouse_button_all_up(&self) -> Result<(), DriverError> {
        self.enqueue(RequestKind::SetMouseButtonAllUp, Vec::new())
    }

    pub fn mouse_button_push(&self, buttons: &[u8]) -> Result<(), DriverError> {
        self.enqueue(RequestKind::SetMouseButtonPush, buttons.to_vec())
    }

    pub fn mouse_move_abs(&self, x: i16, y: i16) -> Result<(), DriverError> {
        let mut fields = Vec::with_capacity(4);
        fields.extend_from_slice(&x.to_be_bytes());
        fields.extend_from_slice(&y.to_be_bytes());
        self.enqueue(RequestKind::SetMouseMoveAbs, fields)
    }

    pub fn mouse_move_rel(&self, dx: i8, dy: i8) -> Result<(), DriverError> {
        self.enqueue(RequestKind::SetMouseMoveRel, vec![dx as u8, dy as u8])
    }

    pub fn mouse_scroll(&self, wheel: i8) -> Result<(), DriverError> {
        self.enqueue(RequestKind::SetMouseScroll, vec![wheel as u8])
    }

    /// Re-requests the USB connection state; the result arrives via
    /// [`VkvmCallbacks::on_vkvm_usb_state`].
    pub fn refresh_usb_state(&self) -> Result<(), DriverError> {
        self.enqueue(RequestKind::GetUsbState, Vec::new())
    }

    /// Re-requests the keyboard LED mask; the result arrives via
    /// [`VkvmCallbacks::on_vkvm_keyboard_leds`].
    pub fn refresh_keyboard_leds(&self) -> Result<(), DriverError> {
        self.enqueue(RequestKind::GetKeyboardLeds, Vec::new())
    }
}

fn writer_loop(inner: Arc<Inner>, mut port: Box<dyn serialport::SerialPort>) {
    let mut encoder = FrameEncoder::new();
    loop {
        let job = match inner.queue.wait_for_work() {
            Some(job) => job,
            None => break,
        };
        let now_ms = inner.now_ms();
        let mut sink = PortSink::new(&mut port);
        let ok = encoder.begin(job.seq, now_ms, &mut sink).is_ok()
            && encoder.write_u8(job.kind.to_u8(), &mut sink).is_ok()
            && encoder.write_bytes(&job.fields, &mut sink).is_ok()
            && encoder.end(&mut sink).is_ok();
        if !ok || sink.failed {
            log::error!("write failed for request seq {} kind {:?}", job.seq, job.kind);
            request_disconnect(&inner, DisconnectReason::SendError);
            break;
        }
        log::trace!("sent seq {} kind {:?}", job.seq, job.kind);
    }
}

fn reader_loop(inner: Arc<Inner>, mut port: Box<dyn serialport::SerialPort>, tick: Duration, timeout: Duration) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 512];
    loop {
        if inner.queue.is_terminated() || inner.cancel.is_cancelled() {
            break;
        }
        match transport::read_tick(&mut port, &mut buf) {
            Ok(0) => {}
            Ok(n) => {
                for &byte in &buf[..n] {
                    decoder.feed(byte, |ev| handle_frame(&inner, ev));
                }
            }
            Err(err) => {
                log::error!("read failed: {err}");
                request_disconnect(&inner, DisconnectReason::RecvError);
                return;
            }
        }
        match inner.queue.check_timeout(timeout) {
            TimeoutCheck::Ok => {}
            TimeoutCheck::NeedsHeartbeat => {
                let _ = inner.queue.enqueue(RequestKind::GetAlive, Vec::new());
            }
            TimeoutCheck::Expired => {
                log::warn!("pending request timed out after {timeout:?}");
                request_disconnect(&inner, DisconnectReason::Timeout);
                return;
            }
        }
        let _ = tick;
    }
}

fn handle_frame(inner: &Arc<Inner>, ev: FrameEvent) {
    match ev {
        FrameEvent::Malformed => {
            inner.callbacks.on_vkvm_broken_frame();
        }
        FrameEvent::Frame { seq, payload, err } => {
            if err {
                inner.callbacks.on_vkvm_broken_frame();
                return;
            }
            if seq == 0 {
                handle_interrupt(inner, payload);
                return;
            }
            match inner.queue.head_seq() {
                Some(head) if head == seq => {}
                Some(head) => {
                    log::debug!("response seq {seq} does not match head {head}, dropping");
                    return;
                }
                None => {
                    log::debug!("response seq {seq} with nothing pending, dropping");
                    return;
                }
            }
            if payload.is_empty() {
                log::debug!("empty response payload for seq {seq}, dropping");
                return;
            }
            let result = match ResponseKind::from_u8(payload[0]) {
                ResponseKind::Ok => PeripheryResult::Ok,
                ResponseKind::Error(kind) => PeripheryResult::from(kind),
                other => {
                    log::debug!("unexpected response-range byte for seq {seq}: {other:?}");
                    return;
                }
            };
            let fields = &payload[1..];
            let Some(req) = inner.queue.complete_head() else { return };
            dispatch_response(inner, req, result, fields);
        }
    }
}

fn handle_interrupt(inner: &Arc<Inner>, payload: &[u8]) {
    if payload.is_empty() {
        log::debug!("empty interrupt payload, dropping");
        return;
    }
    match payload[0] {
        0x40 if payload.len() >= 2 => {
            *inner.usb_state.lock().unwrap() = Some(payload[1]);
            inner.callbacks.on_vkvm_usb_state(PeripheryResult::Ok, payload[1]);
        }
        0x41 if payload.len() >= 2 => {
            *inner.keyboard_leds.lock().unwrap() = Some(payload[1]);
            inner.callbacks.on_vkvm_keyboard_leds(PeripheryResult::Ok, payload[1]);
        }
        other => log::debug!("unrecognized interrupt kind {other:#04x}"),
    }
}

fn handle_version_response(inner: &Arc<Inner>, result: PeripheryResult, fields: &[u8]) {
    let version = if fields.len() >= 2 { Some(u16::from_be_bytes([fields[0], fields[1]])) } else { None };
    if result == PeripheryResult::Ok && version == Some(PROTOCOL_VERSION) {
        *inner.state.lock().unwrap() = LifecycleState::OpenConnected;
        inner.callbacks.on_connected();
        let _ = inner.queue.enqueue(RequestKind::GetUsbState, Vec::new());
        let _ = inner.queue.enqueue(RequestKind::GetKeyboardLeds, Vec::new());
    } else {
        log::error!("protocol handshake failed: result={result:?} version={version:?}");
        request_disconnect(inner, DisconnectReason::InvalidProtocol);
    }
}

/// The dispatch table note from the design section: one match arm per
/// `RequestKind`, each parsing the response shape from §4.2 and calling the
/// matching callback method with the response fields and the echoed
/// request fields.
fn dispatch_response(inner: &Arc<Inner>, req: InFlightRequest, result: PeripheryResult, fields: &[u8]) {
    match req.kind {
        RequestKind::GetProtocolVersion => handle_version_response(inner, result, fields),
        RequestKind::GetAlive => {}
        RequestKind::GetUsbState => {
            if let Some(&state) = fields.first() {
                *inner.usb_state.lock().unwrap() = Some(state);
                inner.callbacks.on_vkvm_usb_state(result, state);
            }
        }
        RequestKind::GetKeyboardLeds => {
            if let Some(&leds) = fields.first() {
                *inner.keyboard_leds.lock().unwrap() = Some(leds);
                inner.callbacks.on_vkvm_keyboard_leds(result, leds);
            }
        }
        RequestKind::SetKeyboardDown => {
            inner.callbacks.on_vkvm_keyboard_down(result, fields.first().copied().unwrap_or(0), &req.fields);
        }
        RequestKind::SetKeyboardUp => {
            inner.callbacks.on_vkvm_keyboard_up(result, fields.first().copied().unwrap_or(0), &req.fields);
        }
        RequestKind::SetKeyboardAllUp => {
            inner.callbacks.on_vkvm_keyboard_all_up(result);
        }
        RequestKind::SetKeyboardPush => {
            inner.callbacks.on_vkvm_keyboard_push(result, fields.first().copied().unwrap_or(0), &req.fields);
        }
        RequestKind::SetKeyboardWrite => {
            let modifier = req.fields.first().copied().unwrap_or(0);
            let keys = req.fields.get(1..).unwrap_or(&[]);
            inner.callbacks.on_vkvm_keyboard_write(result, fields.first().copied().unwrap_or(0), modifier, keys);
        }
        RequestKind::SetMouseButtonDown => {
            inner.callbacks.on_vkvm_mouse_button_down(result, &req.fields);
        }
        RequestKind::SetMouseButtonUp => {
            inner.callbacks.on_vkvm_mouse_button_up(result, &req.fields);
        }
        RequestKind::SetMouseButtonAllUp => {
            inner.callbacks.on_vkvm_mouse_button_all_up(result);
        }
        RequestKind::SetMouseButtonPush => {
            inner.callbacks.on_vkvm_mouse_button_push(result, fields.first().copied().unwrap_or(0), &req.fields);
        }
        RequestKind::SetMouseMoveAbs => {
            if req.fields.len() >= 4 {
                let x = i16::from_be_bytes([req.fields[0], req.fields[1]]);
                let y = i16::from_be_bytes([req.fields[2], req.fields[3]]);
                inner.callbacks.on_vkvm_mouse_move_abs(result, x, y);
            }
        }
        RequestKind::SetMouseMoveRel => {
            if req.fields.len() >= 2 {
                inner.callbacks.on_vkvm_mouse_move_rel(result, req.fields[0] as i8, req.fields[1] as i8);
            }
        }
        RequestKind::SetMouseScroll => {
            if let Some(&wheel) = req.fields.first() {
                inner.callbacks.on_vkvm_mouse_scroll(result, wheel as i8);
            }
        }
    }
}

/// Runs teardown on whatever thread calls it. The reader/writer tasks never
/// call this directly (it would self-join); they call
/// [`request_disconnect`] instead. `close()` calls this directly too,
/// except when invoked from the reader thread itself, where it defers to a
/// spawned thread for the same reason.
fn teardown(inner: &Arc<Inner>, reason: DisconnectReason) {
    inner.queue.terminate();
    inner.cancel.cancel();
    let (reader, writer) = {
        let mut threads = inner.threads.lock().unwrap();
        (threads.reader.take(), threads.writer.take())
    };
    if let Some(handle) = writer {
        let _ = handle.join();
    }
    if let Some(handle) = reader {
        let _ = handle.join();
    }
    inner.queue.drain();
    *inner.state.lock().unwrap() = LifecycleState::Closed;
    log::info!("disconnected: {reason:?}");
    inner.callbacks.on_disconnected(reason);
}

/// Called from the reader or writer thread on an unrecoverable error.
/// Acquires the disconnect guard (a second concurrent failure is dropped,
/// collapsing both into one `on_disconnected`) and tears down on a fresh
/// thread so the calling task is not asked to join itself.
fn request_disconnect(inner: &Arc<Inner>, reason: DisconnectReason) {
    if inner
        .disconnecting
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }
    let inner = inner.clone();
    std::thread::spawn(move || {
        teardown(&inner, reason);
        inner.disconnecting.store(false, Ordering::SeqCst);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::VkvmCallbacks;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingCallbacks {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
    }

    impl VkvmCallbacks for RecordingCallbacks {
        fn on_connected(&self) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
        fn on_disconnected(&self, _reason: DisconnectReason) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn close_before_open_is_a_no_op() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let driver = VkvmDriver::new(callbacks);
        assert!(!driver.close());
    }

    #[test]
    fn double_close_is_idempotent() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let driver = VkvmDriver::new(callbacks);
        // Force the state as if it had opened, without a real port, to
        // exercise the idempotence of close() in isolation.
        *driver.inner.state.lock().unwrap() = LifecycleState::OpenConnected;
        assert!(driver.close());
        assert!(!driver.close());
    }

    #[test]
    fn enqueue_while_closed_fails() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let driver = VkvmDriver::new(callbacks);
        assert!(matches!(driver.keyboard_all_up(), Err(DriverError::NotOpen)));
    }

    /// Regression test for the callback-triggered `close()` self-join: a
    /// callback invoked on the reader thread is allowed to call `close()`
    /// (§9's "cyclic call" case), and this must not hang waiting on the
    /// reader to join itself.
    #[test]
    fn close_from_reader_thread_does_not_deadlock() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let driver = VkvmDriver::new(callbacks.clone());
        *driver.inner.state.lock().unwrap() = LifecycleState::OpenConnected;

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
        let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
        let thread_driver = driver.clone();
        let handle = std::thread::spawn(move || {
            ready_tx.send(()).unwrap();
            go_rx.recv().unwrap();
            assert!(thread_driver.close());
        });
        ready_rx.recv().unwrap();
        *driver.inner.threads.lock().unwrap() = Threads { reader: Some(handle), writer: None };
        go_tx.send(()).unwrap();

        for _ in 0..200 {
            if callbacks.disconnected.load(Ordering::SeqCst) > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(callbacks.disconnected.load(Ordering::SeqCst), 1);
    }
}
