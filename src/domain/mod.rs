//! Domain layer - wire envelopes, identities, lifecycle and errors.
//!
//! Contains no I/O. Everything here is shared by the client and server
//! halves of the crate.

pub mod envelope;
pub mod errors;
pub mod events;
mod ids;
mod state;

pub use envelope::{ClientEnvelope, Inbound, InboundFrame, ServerEnvelope};
pub use errors::{ChannelError, DecodeError, RoomError, TransportError};
pub use events::{is_reserved, CLOSE_EVENT, CONNECT_EVENT, ERROR_EVENT, MESSAGE_EVENT};
pub use ids::{ChannelId, ListenerId};
pub use state::{ChannelState, InvalidTransition, StateMachine};
