//! In-memory transport for tests.
//!
//! Records every frame instead of delivering it. Sends can be made to
//! fail to exercise error paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::domain::TransportError;
use crate::ports::Transport;

/// Transport that captures outbound frames.
///
/// # Example
///
/// ```ignore
/// let transport = Arc::new(InMemoryTransport::new());
/// let client = Client::new(transport.clone());
/// client.handle_event(TransportEvent::Open { protocol: None });
/// client.emit("ping", 1)?;
/// assert_eq!(transport.sent_frames().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    sent: Mutex<Vec<String>>,
    close_request: Mutex<Option<(u16, String)>>,
    failing: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every frame sent so far, in order.
    pub fn sent_frames(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// Sent frames parsed as JSON. Unparseable frames are skipped.
    pub fn sent_values(&self) -> Vec<Value> {
        lock(&self.sent)
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Drain the captured frames.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.sent))
    }

    /// Most recent `close` request, if any.
    pub fn close_requested(&self) -> Option<(u16, String)> {
        lock(&self.close_request).clone()
    }

    /// Make subsequent sends fail with `TransportError::Send`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Send("simulated failure".to_string()));
        }
        lock(&self.sent).push(frame);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        *lock(&self.close_request) = Some((code, reason.to_string()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
