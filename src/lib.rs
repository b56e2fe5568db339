//! eventsock - named events and broadcast rooms over one streaming connection.
//!
//! Clients and a server exchange small JSON envelopes over a single
//! transport connection. Many named events are multiplexed onto that
//! connection, sends made before the transport opens are queued, and the
//! server can address groups of connections by room.
//!
//! - [`domain`] - envelopes, identities, lifecycle, errors
//! - [`ports`] - the transport contract
//! - [`application`] - channel, router, client, server, rooms, broadcast
//! - [`adapters`] - in-memory and WebSocket transports
//! - [`config`] - environment-driven configuration
//! - [`telemetry`] - tracing setup

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;

pub use application::{Client, EmitOptions, Server, ServerSocket};
pub use domain::{ChannelError, ChannelId, ChannelState};
pub use ports::{Transport, TransportEvent};
