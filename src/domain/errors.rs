//! Error types for the connection layer.
//!
//! All per-message failures are contained to the handling of that one
//! message. None of these errors close a channel by themselves.

use thiserror::Error;

use super::ids::ChannelId;

/// An inbound frame could not be turned into a dispatchable envelope.
///
/// Dropped and logged by the router; the channel keeps running.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("unrecognized envelope type '{0}'")]
    UnknownType(String),
}

/// Failure surfaced by the underlying streaming transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("transport send failed: {0}")]
    Send(String),
}

/// Errors returned to callers of channel operations.
///
/// Inbound decode failures never reach callers; see [`DecodeError`].
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel {0} is closed")]
    ChannelClosed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ChannelError {
    /// Creates a closed-channel error for an optional channel identity.
    pub fn closed(id: Option<&ChannelId>) -> Self {
        ChannelError::ChannelClosed(
            id.map(|id| id.to_string())
                .unwrap_or_else(|| "<unassigned>".to_string()),
        )
    }

    /// True if the error means the channel no longer accepts sends.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            ChannelError::ChannelClosed(_) | ChannelError::Transport(TransportError::Closed)
        )
    }
}

/// Reasons a room membership could not be removed.
///
/// Never raised as a panic; `leave` flattens these into `false`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room '{0}' does not exist")]
    RoomNotFound(String),

    #[error("channel {channel} is not a member of room '{room}'")]
    NotAMember { room: String, channel: ChannelId },
}
