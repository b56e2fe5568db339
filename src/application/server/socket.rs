//! Server-side handle for one accepted connection.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::Serialize;
use serde_json::Value;

use crate::domain::{
    ChannelError, ChannelId, ChannelState, ClientEnvelope, ListenerId, RoomError, ServerEnvelope,
};
use crate::ports::{Transport, TransportEvent};

use crate::application::channel::Channel;
use crate::application::router::Routed;

use super::ServerShared;

/// One connected client, as seen by the server.
///
/// Handed to `Server::on_connection` callbacks. Room membership lives in
/// the owning server's registry; this handle only refers to it.
pub struct ServerSocket {
    id: ChannelId,
    channel: Channel<ClientEnvelope>,
    server: Weak<ServerShared>,
    subscriptions: RwLock<HashSet<String>>,
}

impl ServerSocket {
    pub(super) fn new(
        id: ChannelId,
        transport: Arc<dyn Transport>,
        protocol: Option<String>,
        server: Weak<ServerShared>,
    ) -> Self {
        Self {
            channel: Channel::new_open(Some(id.clone()), transport, protocol),
            id,
            server,
            subscriptions: RwLock::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn protocol(&self) -> Option<String> {
        self.channel.protocol()
    }

    /// Register a listener for events sent by this client.
    pub fn on<L>(&self, event_name: &str, listener: L) -> ListenerId
    where
        L: Fn(&[Value]) + Send + Sync + 'static,
    {
        tracing::trace!(channel_id = %self.id, event = event_name, "Registering listener");
        self.channel
            .router()
            .listeners()
            .add(event_name, Arc::new(listener))
    }

    /// Unregister one listener. Returns false if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.channel.router().listeners().remove(id)
    }

    pub fn remove_all_listeners(&self, event_name: &str) -> usize {
        self.channel.router().listeners().remove_all(event_name)
    }

    /// Untyped payload for the client's `message` listeners.
    pub fn write(&self, data: impl Serialize) -> Result<(), ChannelError> {
        let data = serde_json::to_value(data).map_err(ChannelError::Encode)?;
        self.send_frame(ServerEnvelope::raw(data).encode()?)
    }

    /// Typed payload, seen only by client listeners of `event_name`.
    pub fn emit(&self, event_name: &str, data: impl Serialize) -> Result<(), ChannelError> {
        let data = serde_json::to_value(data).map_err(ChannelError::Encode)?;
        self.send_frame(ServerEnvelope::new(event_name, data).encode()?)
    }

    /// Join a room on the owning server. Idempotent.
    pub fn join(&self, room: &str) -> bool {
        match self.server.upgrade() {
            Some(server) if self.is_registered_in(&server) => server.registry.join(room, &self.id),
            _ => false,
        }
    }

    /// Leave a room. False if this socket was not a member.
    pub fn leave(&self, room: &str) -> bool {
        self.try_leave(room).is_ok()
    }

    /// Leave a room, reporting why if nothing changed.
    pub fn try_leave(&self, room: &str) -> Result<(), RoomError> {
        match self.server.upgrade() {
            Some(server) if self.is_registered_in(&server) => server.registry.try_leave(room, &self.id),
            Some(_) => Err(RoomError::NotAMember {
                room: room.to_string(),
                channel: self.id.clone(),
            }),
            None => Err(RoomError::RoomNotFound(room.to_string())),
        }
    }

    /// Rooms this socket currently belongs to.
    pub fn rooms(&self) -> Vec<String> {
        self.server
            .upgrade()
            .filter(|server| self.is_registered_in(server))
            .map(|server| server.registry.rooms_of(&self.id))
            .unwrap_or_default()
    }

    /// Custom events the client announced it listens for.
    ///
    /// Advisory only; broadcasts are not filtered by it.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn is_subscribed(&self, event_name: &str) -> bool {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(event_name)
    }

    /// Ask the transport to close this connection.
    pub fn close(&self, code: u16, reason: &str) {
        self.channel.close(code, reason);
    }

    /// Feed one transport event. Called by the transport adapter.
    ///
    /// On close the socket is removed from every room and from the
    /// server's live map after its `close` listeners have run.
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Open { protocol } => self.channel.handle_open(protocol),
            TransportEvent::Message(raw) => {
                if let Some(Routed::Subscription(event_name)) = self.channel.handle_message(&raw) {
                    tracing::trace!(channel_id = %self.id, event = %event_name, "Client subscribed");
                    self.subscriptions
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(event_name);
                }
            }
            TransportEvent::Close { code, reason } => {
                if self.channel.handle_close(code, &reason) {
                    if let Some(server) = self.server.upgrade() {
                        if self.is_registered_in(&server) {
                            server.registry.remove_channel(&self.id);
                        }
                    }
                }
            }
            TransportEvent::Error(detail) => self.channel.handle_error(&detail),
        }
    }

    /// A reused id may already belong to a newer socket.
    fn is_registered_in(&self, server: &ServerShared) -> bool {
        server
            .registry
            .channel(&self.id)
            .is_some_and(|socket| std::ptr::eq(Arc::as_ptr(&socket), self))
    }

    pub(crate) fn send_frame(&self, frame: String) -> Result<(), ChannelError> {
        self.channel.send_frame(frame)
    }
}

impl std::fmt::Debug for ServerSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSocket")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
