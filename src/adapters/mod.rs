//! Adapters - Implementations of the transport port.
//!
//! - `memory` - In-memory transport for tests
//! - `websocket` - axum server and tokio-tungstenite client transports

pub mod memory;
pub mod websocket;

pub use memory::InMemoryTransport;
pub use websocket::{connect, websocket_router, ws_handler, WebSocketState};
