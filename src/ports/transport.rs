//! Transport port - the raw streaming connection underneath a channel.
//!
//! Handshake, framing, fallback negotiation and TLS all live behind this
//! trait. A channel only needs to push one string frame at a time and to
//! be told about lifecycle events.

use crate::domain::TransportError;

/// Events a transport reports to the channel wrapping it.
///
/// Adapters feed these into `Client::handle_event` or
/// `ServerSocket::handle_event`, one at a time and in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake finished. Carries the negotiated protocol if known.
    Open { protocol: Option<String> },

    /// One inbound frame.
    Message(String),

    /// The connection is gone. Terminal.
    Close { code: u16, reason: String },

    /// Something went wrong below. The transport decides whether a
    /// `Close` follows.
    Error(String),
}

impl TransportEvent {
    /// Normal closure (RFC 6455 code 1000).
    pub fn normal_close() -> Self {
        TransportEvent::Close {
            code: 1000,
            reason: "Normal closure".to_string(),
        }
    }
}

/// Port for the raw byte-delivery layer.
///
/// Implementations must not block: `send` enqueues the frame for delivery
/// and returns. No channel lock is held during `send` or `close`, so an
/// implementation may feed `TransportEvent`s back into the same channel
/// from inside either call.
pub trait Transport: Send + Sync {
    /// Deliver one serialized envelope to the peer.
    fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Ask the transport to close. The channel stays usable until the
    /// transport reports `TransportEvent::Close`.
    fn close(&self, code: u16, reason: &str);
}
