//! Server side: accepted connections, rooms and broadcast.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Server                              │
//! │   on_connection callbacks        Broadcaster                  │
//! └──────────────────────────────────────────────────────────────┘
//!                 │ owns
//!                 ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RoomRegistry                           │
//! │   live: a, b, c        lobby → {a, b}       game1 → {a}       │
//! └──────────────────────────────────────────────────────────────┘
//!                 │ holds
//!                 ▼
//!         ServerSocket a   ServerSocket b   ServerSocket c
//! ```
//!
//! Each `Server` owns its own registry, so independent instances never
//! share membership.

mod broadcaster;
mod rooms;
mod socket;

pub use broadcaster::{Broadcaster, EmitOptions, RoomBroadcast};
pub use rooms::RoomRegistry;
pub use socket::ServerSocket;

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::domain::{ChannelError, ChannelId};
use crate::ports::Transport;

/// Callback run for every accepted connection.
pub type ConnectionListener = Arc<dyn Fn(Arc<ServerSocket>) + Send + Sync>;

pub(crate) struct ServerShared {
    pub(crate) registry: RoomRegistry<Arc<ServerSocket>>,
    connection_listeners: RwLock<Vec<ConnectionListener>>,
}

/// A server instance. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Server {
    shared: Arc<ServerShared>,
}

impl Server {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ServerShared {
                registry: RoomRegistry::new(),
                connection_listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a callback for newly accepted connections.
    pub fn on_connection<L>(&self, listener: L)
    where
        L: Fn(Arc<ServerSocket>) + Send + Sync + 'static,
    {
        self.shared
            .connection_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Take ownership of an opened transport connection.
    ///
    /// The socket is registered as live before `on_connection` callbacks
    /// run, so they may join rooms straight away.
    pub fn accept(
        &self,
        id: ChannelId,
        transport: Arc<dyn Transport>,
        protocol: Option<String>,
    ) -> Arc<ServerSocket> {
        tracing::debug!(channel_id = %id, protocol = ?protocol, "New client connected");

        if let Some(previous) = self.shared.registry.remove_channel(&id) {
            tracing::warn!(channel_id = %id, "Channel id reused, dropping previous connection");
            previous.close(1000, "Replaced by a new connection");
        }

        let socket = Arc::new(ServerSocket::new(
            id.clone(),
            transport,
            protocol,
            Arc::downgrade(&self.shared),
        ));
        self.shared.registry.register(id, Arc::clone(&socket));

        let listeners: Vec<ConnectionListener> = self
            .shared
            .connection_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(Arc::clone(&socket));
        }
        socket
    }

    /// Look up a live connection.
    pub fn socket(&self, id: &ChannelId) -> Option<Arc<ServerSocket>> {
        self.shared.registry.channel(id)
    }

    pub fn connection_count(&self) -> usize {
        self.shared.registry.channel_count()
    }

    pub fn room_names(&self) -> Vec<String> {
        self.shared.registry.room_names()
    }

    pub fn room_members(&self, room: &str) -> Vec<ChannelId> {
        self.shared.registry.members(room)
    }

    pub fn registry(&self) -> &RoomRegistry<Arc<ServerSocket>> {
        &self.shared.registry
    }

    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster::new(Arc::clone(&self.shared))
    }

    /// Untyped payload to every connection's `message` listeners.
    pub fn write_all(&self, data: impl Serialize) -> Result<usize, ChannelError> {
        self.broadcaster().write_all(data)
    }

    /// Typed payload to every connection.
    pub fn emit(&self, event_name: &str, data: impl Serialize) -> Result<usize, ChannelError> {
        self.broadcaster().emit_all(event_name, data)
    }

    /// Handle scoped to one room.
    pub fn rooms(&self, room: &str) -> RoomBroadcast {
        self.broadcaster().room(room)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}
