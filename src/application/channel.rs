//! Channel - one peer connection with its pending-send queue.
//!
//! Shared by `Client` and `ServerSocket`. The channel mirrors its
//! transport's lifecycle and decides per send whether to queue, forward
//! or refuse:
//!
//! | state      | `send_frame`                        |
//! |------------|-------------------------------------|
//! | Connecting | appended to the pending queue       |
//! | Open       | forwarded to the transport          |
//! | Closed     | `ChannelError::ChannelClosed`       |
//!
//! The open transition runs, in order: store the negotiated protocol,
//! emit `connect`, flush the pending queue. Anything sent from a
//! `connect` listener is queued behind earlier sends.
//!
//! Open-state frames go through one ordered outgoing queue. Whichever
//! caller finds the queue idle drains it, calling `Transport::send` with
//! no channel lock held, so a transport may report events back into the
//! channel from inside `send`. Per-channel FIFO holds either way.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};

use crate::domain::{
    ChannelError, ChannelId, ChannelState, InboundFrame, TransportError, CLOSE_EVENT,
    CONNECT_EVENT, ERROR_EVENT,
};
use crate::ports::Transport;

use super::router::{EventRouter, Routed};

#[derive(Debug, Default)]
struct Outbound {
    state: ChannelState,
    pending: Vec<String>,
    outgoing: VecDeque<String>,
    sending: bool,
    protocol: Option<String>,
    last_error: Option<String>,
}

/// One peer connection, decoding inbound frames of shape `F`.
pub struct Channel<F> {
    id: Option<ChannelId>,
    transport: Arc<dyn Transport>,
    outbound: Mutex<Outbound>,
    router: EventRouter<F>,
}

impl<F: InboundFrame> Channel<F> {
    /// Wraps a transport whose handshake has not finished yet.
    pub fn new(id: Option<ChannelId>, transport: Arc<dyn Transport>) -> Self {
        Self {
            id,
            transport,
            outbound: Mutex::new(Outbound::default()),
            router: EventRouter::new(),
        }
    }

    /// Wraps a transport that is already open (server-accepted connections).
    pub fn new_open(
        id: Option<ChannelId>,
        transport: Arc<dyn Transport>,
        protocol: Option<String>,
    ) -> Self {
        let channel = Self::new(id, transport);
        {
            let mut outbound = channel.lock();
            outbound.state = ChannelState::Open;
            outbound.protocol = protocol;
        }
        channel
    }

    pub fn id(&self) -> Option<&ChannelId> {
        self.id.as_ref()
    }

    pub fn state(&self) -> ChannelState {
        self.lock().state
    }

    /// Protocol reported by the transport on open, if any.
    pub fn protocol(&self) -> Option<String> {
        self.lock().protocol.clone()
    }

    /// Detail of the most recent transport error.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Number of frames waiting for the open transition.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn router(&self) -> &EventRouter<F> {
        &self.router
    }

    /// Queue, forward or refuse one serialized envelope.
    pub fn send_frame(&self, frame: String) -> Result<(), ChannelError> {
        let mut outbound = self.lock();
        let state = outbound.state;
        match state {
            ChannelState::Connecting => {
                tracing::trace!(
                    channel_id = ?self.id,
                    pending = outbound.pending.len() + 1,
                    "Queueing frame until transport opens"
                );
                outbound.pending.push(frame);
                Ok(())
            }
            ChannelState::Open => {
                outbound.outgoing.push_back(frame);
                if outbound.sending {
                    // Delivered in order by the caller already draining
                    return Ok(());
                }
                outbound.sending = true;
                drop(outbound);
                self.drain_outgoing().map_err(ChannelError::from)
            }
            ChannelState::Closed => Err(ChannelError::closed(self.id.as_ref())),
        }
    }

    /// Ask the transport to close. State changes when it reports back.
    pub fn close(&self, code: u16, reason: &str) {
        if self.state() == ChannelState::Closed {
            return;
        }
        tracing::debug!(channel_id = ?self.id, code, reason, "Requesting transport close");
        self.transport.close(code, reason);
    }

    /// Transport finished its handshake.
    pub fn handle_open(&self, protocol: Option<String>) {
        {
            let mut outbound = self.lock();
            if outbound.state != ChannelState::Connecting {
                tracing::warn!(
                    channel_id = ?self.id,
                    state = %outbound.state,
                    "Ignoring duplicate open"
                );
                return;
            }
            outbound.protocol = protocol;
        }

        tracing::debug!(channel_id = ?self.id, protocol = ?self.protocol(), "Connection open");
        self.router.emit_local(CONNECT_EVENT, &[]);

        let mut outbound = self.lock();
        let next = match outbound.state.transition_to(ChannelState::Open) {
            Ok(next) => next,
            // Closed from inside a connect listener
            Err(_) => return,
        };

        let pending = std::mem::take(&mut outbound.pending);
        if !pending.is_empty() {
            tracing::debug!(channel_id = ?self.id, count = pending.len(), "Flushing pending frames");
        }
        outbound.outgoing.extend(pending);
        outbound.state = next;
        if outbound.sending || outbound.outgoing.is_empty() {
            return;
        }
        outbound.sending = true;
        drop(outbound);

        if let Err(e) = self.drain_outgoing() {
            tracing::warn!(channel_id = ?self.id, error = %e, "Failed to flush pending frame");
        }
    }

    /// One inbound frame. Malformed frames are logged and dropped.
    pub fn handle_message(&self, raw: &str) -> Option<Routed> {
        if self.state() == ChannelState::Closed {
            tracing::debug!(channel_id = ?self.id, "Ignoring frame received after close");
            return None;
        }

        tracing::trace!(channel_id = ?self.id, frame = raw, "Received frame");
        match self.router.route(raw) {
            Ok(routed) => Some(routed),
            Err(e) => {
                tracing::warn!(channel_id = ?self.id, error = %e, "Dropping undecodable frame");
                None
            }
        }
    }

    /// Transport reported an error. Does not close the channel.
    pub fn handle_error(&self, detail: &str) {
        self.lock().last_error = Some(detail.to_string());
        tracing::warn!(channel_id = ?self.id, error = detail, "Transport error");
        self.router.emit_local(ERROR_EVENT, &[Value::String(detail.to_string())]);
    }

    /// Transport closed. Returns false if the channel was already closed.
    ///
    /// Emits `close` with `(code, reason)` and then drops every listener.
    pub fn handle_close(&self, code: u16, reason: &str) -> bool {
        let dropped = {
            let mut outbound = self.lock();
            if outbound.state == ChannelState::Closed {
                return false;
            }
            outbound.state = ChannelState::Closed;
            outbound.outgoing.clear();
            std::mem::take(&mut outbound.pending).len()
        };

        if dropped > 0 {
            tracing::warn!(
                channel_id = ?self.id,
                dropped,
                "Closed before opening, pending frames were never sent"
            );
        }
        tracing::debug!(channel_id = ?self.id, code, reason, "Connection closed");

        self.router.emit_local(CLOSE_EVENT, &[json!(code), json!(reason)]);
        self.router.listeners().clear();
        true
    }

    /// Send queued frames until the queue is empty.
    ///
    /// Returns the result of the first frame. Later failures belong to
    /// frames queued by other callers and are only logged.
    fn drain_outgoing(&self) -> Result<(), TransportError> {
        let mut result = Ok(());
        let mut first = true;
        while let Some(frame) = self.next_outgoing() {
            tracing::trace!(channel_id = ?self.id, "Sending frame");
            match self.transport.send(frame) {
                Err(e) if first => result = Err(e),
                Err(e) => {
                    tracing::warn!(channel_id = ?self.id, error = %e, "Failed to deliver queued frame")
                }
                Ok(()) => {}
            }
            first = false;
        }
        result
    }

    fn next_outgoing(&self) -> Option<String> {
        let mut outbound = self.lock();
        let frame = outbound.outgoing.pop_front();
        if frame.is_none() {
            outbound.sending = false;
        }
        frame
    }

    fn lock(&self) -> MutexGuard<'_, Outbound> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
