//! Fan-out of writes and emits to every channel or to one room.
//!
//! Targets are snapshotted before any frame is sent. Listeners that run
//! during the fan-out may join, leave or disconnect; a target that is no
//! longer live (or no longer in the room) when its turn comes is skipped.
//! Iteration order across channels is unspecified.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::{ChannelError, ChannelId, ChannelState, ServerEnvelope};

use super::socket::ServerSocket;
use super::ServerShared;

/// Options for a room-scoped emit.
#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    /// Channels that must not receive the emit.
    pub skip: Vec<ChannelId>,
}

impl EmitOptions {
    pub fn skip(ids: impl IntoIterator<Item = ChannelId>) -> Self {
        Self {
            skip: ids.into_iter().collect(),
        }
    }
}

/// Server-wide fan-out.
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<ServerShared>,
}

impl Broadcaster {
    pub(super) fn new(shared: Arc<ServerShared>) -> Self {
        Self { shared }
    }

    /// Untyped payload to every live channel's `message` listeners.
    ///
    /// Returns how many channels the frame was handed to.
    pub fn write_all(&self, data: impl Serialize) -> Result<usize, ChannelError> {
        let data = serde_json::to_value(data).map_err(ChannelError::Encode)?;
        let frame = ServerEnvelope::raw(data).encode()?;
        tracing::debug!(frame = %frame, "write_all");
        Ok(self.deliver(None, &frame, &HashSet::new()))
    }

    /// Typed payload to every live channel.
    pub fn emit_all(&self, event_name: &str, data: impl Serialize) -> Result<usize, ChannelError> {
        let data = serde_json::to_value(data).map_err(ChannelError::Encode)?;
        let frame = ServerEnvelope::new(event_name, data).encode()?;
        tracing::debug!(event = event_name, "emit_all");
        Ok(self.deliver(None, &frame, &HashSet::new()))
    }

    /// Handle scoped to one room's current members.
    pub fn room(&self, room: &str) -> RoomBroadcast {
        RoomBroadcast {
            broadcaster: self.clone(),
            room: room.to_string(),
        }
    }

    fn deliver(&self, room: Option<&str>, frame: &str, skip: &HashSet<ChannelId>) -> usize {
        let registry = &self.shared.registry;
        let targets: Vec<(ChannelId, Arc<ServerSocket>)> = match room {
            Some(room) => registry.member_channels(room),
            None => registry.channels(),
        };

        let mut delivered = 0;
        for (id, socket) in targets {
            if skip.contains(&id) {
                tracing::debug!(room = ?room, channel_id = %id, "Skipped by request");
                continue;
            }

            let still_targeted = match room {
                Some(room) => registry.is_member(room, &id),
                None => registry.contains_channel(&id),
            };
            if !still_targeted || socket.state() == ChannelState::Closed {
                tracing::debug!(room = ?room, channel_id = %id, "Target gone mid-broadcast");
                continue;
            }

            match socket.send_frame(frame.to_string()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(room = ?room, channel_id = %id, error = %e, "Broadcast send failed");
                }
            }
        }
        delivered
    }
}

/// Fan-out to the members of one room.
pub struct RoomBroadcast {
    broadcaster: Broadcaster,
    room: String,
}

impl RoomBroadcast {
    pub fn name(&self) -> &str {
        &self.room
    }

    /// Typed payload to every member except those in `options.skip`.
    pub fn emit(
        &self,
        event_name: &str,
        data: impl Serialize,
        options: &EmitOptions,
    ) -> Result<usize, ChannelError> {
        let data = serde_json::to_value(data).map_err(ChannelError::Encode)?;
        let frame = ServerEnvelope::new(event_name, data).encode()?;
        let skip: HashSet<ChannelId> = options.skip.iter().cloned().collect();
        tracing::debug!(room = %self.room, event = event_name, skipped = skip.len(), "Room emit");
        Ok(self.broadcaster.deliver(Some(&self.room), &frame, &skip))
    }

    /// Untyped payload to every member's `message` listeners.
    pub fn write(&self, data: impl Serialize) -> Result<usize, ChannelError> {
        let data = serde_json::to_value(data).map_err(ChannelError::Encode)?;
        let frame = ServerEnvelope::raw(data).encode()?;
        tracing::debug!(room = %self.room, "Room write");
        Ok(self.broadcaster.deliver(Some(&self.room), &frame, &HashSet::new()))
    }
}
