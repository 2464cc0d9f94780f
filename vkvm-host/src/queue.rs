//! The bounded FIFO of in-flight requests. One lock guards the entries, the
//! `pending` flag, `last_sent_at` and the sequence counter together, exactly
//! the grouping the driver's concurrency model requires.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use vkvm_protocol::catalog::RequestKind;

use crate::error::DriverError;

/// What a reader should do after checking elapsed time against the
/// keep-alive/timeout policy.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TimeoutCheck {
    /// Nothing to do yet.
    Ok,
    /// Nothing has been sent in `timeout`; the reader should enqueue a
    /// `GET_ALIVE` heartbeat.
    NeedsHeartbeat,
    /// The head request has been pending longer than `timeout`; disconnect.
    Expired,
}

/// One queued request: its wire kind and already-serialized field bytes.
/// The response, once it arrives, is dispatched by the driver to the one
/// callback object registered at `open()` time (see `driver::deliver`); the
/// queue itself holds no per-request callback.
pub struct InFlightRequest {
    pub seq: u8,
    pub kind: RequestKind,
    pub fields: Vec<u8>,
}

/// One request ready to be handed to the writer: everything it needs to
/// serialize the frame, without exposing the rest of the queue.
pub struct WriterJob {
    pub seq: u8,
    pub kind: RequestKind,
    pub fields: Vec<u8>,
}

struct Inner {
    entries: VecDeque<InFlightRequest>,
    pending: bool,
    last_sent_at: Instant,
    next_seq: u8,
    terminate: bool,
    capacity: usize,
}

impl Inner {
    fn alloc_seq(&mut self) -> u8 {
        loop {
            self.next_seq = self.next_seq.wrapping_add(1);
            if self.next_seq != 0 {
                return self.next_seq;
            }
        }
    }
}

pub struct RequestQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        RequestQueue {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                pending: false,
                last_sent_at: Instant::now(),
                next_seq: 0,
                terminate: false,
                capacity,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Appends a request, returning its allocated sequence number.
    pub fn enqueue(&self, kind: RequestKind, fields: Vec<u8>) -> Result<u8, DriverError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.len() >= inner.capacity {
            return Err(DriverError::QueueFull);
        }
        let seq = inner.alloc_seq();
        inner.entries.push_back(InFlightRequest { seq, kind, fields });
        drop(inner);
        self.not_empty.notify_one();
        Ok(seq)
    }

    /// Blocks until there is a head request to send and none is currently
    /// pending, or termination was requested. Marks the head pending and
    /// stamps `last_sent_at` before returning it.
    pub fn wait_for_work(&self) -> Option<WriterJob> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.terminate {
                return None;
            }
            if !inner.pending {
                if let Some(head) = inner.entries.front() {
                    let job = WriterJob { seq: head.seq, kind: head.kind, fields: head.fields.clone() };
                    inner.pending = true;
                    inner.last_sent_at = Instant::now();
                    return Some(job);
                }
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Removes the head entry (a response arrived for it) and clears
    /// `pending`, waking the writer so it can move on to the next request.
    pub fn complete_head(&self) -> Option<InFlightRequest> {
        let mut inner = self.inner.lock().unwrap();
        let head = inner.entries.pop_front();
        inner.pending = false;
        drop(inner);
        self.not_empty.notify_one();
        head
    }

    /// True if the current head's sequence number matches `seq`.
    pub fn head_seq(&self) -> Option<u8> {
        self.inner.lock().unwrap().entries.front().map(|e| e.seq)
    }

    /// Applies the keep-alive / pending-timeout policy given the configured
    /// timeout.
    pub fn check_timeout(&self, timeout: Duration) -> TimeoutCheck {
        let inner = self.inner.lock().unwrap();
        let elapsed = inner.last_sent_at.elapsed();
        if inner.pending {
            if elapsed >= timeout {
                TimeoutCheck::Expired
            } else {
                TimeoutCheck::Ok
            }
        } else if elapsed >= timeout {
            TimeoutCheck::NeedsHeartbeat
        } else {
            TimeoutCheck::Ok
        }
    }

    /// Signals termination and wakes anyone waiting on the queue.
    pub fn terminate(&self) {
        self.inner.lock().unwrap().terminate = true;
        self.not_empty.notify_all();
    }

    /// True once `terminate()` has been called for this open/close cycle.
    pub fn is_terminated(&self) -> bool {
        self.inner.lock().unwrap().terminate
    }

    /// Drops every queued entry without invoking their callbacks, per the
    /// disconnect contract: only `on_disconnected` fires for in-flight work.
    pub fn drain(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.pending = false;
    }

    /// Resets sequence allocation and timing state for a fresh `open()`.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.pending = false;
        inner.next_seq = 0;
        inner.last_sent_at = Instant::now();
        inner.terminate = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_allocation_never_yields_zero() {
        let q = RequestQueue::new(8);
        for _ in 0..300 {
            let seq = q.enqueue(RequestKind::GetAlive, Vec::new()).unwrap();
            assert_ne!(seq, 0);
            q.complete_head();
        }
    }

    #[test]
    fn queue_full_fails_fast() {
        let q = RequestQueue::new(2);
        q.enqueue(RequestKind::GetAlive, Vec::new()).unwrap();
        q.enqueue(RequestKind::GetAlive, Vec::new()).unwrap();
        let result = q.enqueue(RequestKind::GetAlive, Vec::new());
        assert!(matches!(result, Err(DriverError::QueueFull)));
    }

    #[test]
    fn at_most_one_pending_at_a_time() {
        let q = RequestQueue::new(8);
        q.enqueue(RequestKind::GetAlive, Vec::new()).unwrap();
        q.enqueue(RequestKind::GetUsbState, Vec::new()).unwrap();
        let first = q.wait_for_work().unwrap();
        assert_eq!(first.kind, RequestKind::GetAlive);
        // A second call must not hand out the next entry while one is pending.
        let q2 = std::sync::Arc::new(q);
        let q3 = q2.clone();
        let handle = std::thread::spawn(move || q3.wait_for_work());
        std::thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());
        q2.complete_head();
        let second = handle.join().unwrap().unwrap();
        assert_eq!(second.kind, RequestKind::GetUsbState);
    }

    #[test]
    fn terminate_wakes_a_blocked_waiter() {
        let q = std::sync::Arc::new(RequestQueue::new(8));
        let q2 = q.clone();
        let handle = std::thread::spawn(move || q2.wait_for_work());
        std::thread::sleep(Duration::from_millis(20));
        q.terminate();
        assert!(handle.join().unwrap().is_none());
    }
}
