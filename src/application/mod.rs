//! Application layer - connection lifecycle, dispatch, rooms, broadcast.
//!
//! ```text
//! inbound:  Transport ─► Channel (parse) ─► EventRouter ─► listeners
//! outbound: caller ─► Channel (encode, maybe queue) ─► Transport::send
//! server:   caller ─► Broadcaster ─► RoomRegistry snapshot ─► ServerSocket
//! ```

pub mod channel;
pub mod client;
pub mod listeners;
pub mod router;
pub mod server;

pub use channel::Channel;
pub use client::Client;
pub use listeners::{Listener, ListenerRegistry};
pub use router::{EventRouter, Routed};
pub use server::{
    Broadcaster, ConnectionListener, EmitOptions, RoomBroadcast, RoomRegistry, Server,
    ServerSocket,
};
