//! WebSocket transport adapters.
//!
//! - [`handler`] - axum upgrade handler, server side
//! - [`client`] - tokio-tungstenite connector, client side

pub mod client;
pub mod handler;

pub use client::connect;
pub use handler::{websocket_router, ws_handler, WebSocketState};
