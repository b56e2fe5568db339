//! WebSocket upgrade handler feeding accepted connections into a `Server`.
//!
//! Handles the HTTP → WebSocket upgrade and manages the connection lifecycle:
//! 1. Upgrade to WebSocket
//! 2. Accept into the server (fires `on_connection`)
//! 3. Pump frames both ways until either side stops
//! 4. Report the close so rooms are cleaned up

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::application::Server;
use crate::config::ServerConfig;
use crate::domain::{ChannelId, TransportError};
use crate::ports::{Transport, TransportEvent};

/// How long the writer may take to flush the close echo.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Code recorded when the connection ended without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub server: Server,
}

impl WebSocketState {
    pub fn new(server: Server) -> Self {
        Self { server }
    }
}

/// Outbound half of an accepted WebSocket, as seen by its channel.
struct AxumTransport {
    outbound: mpsc::UnboundedSender<Message>,
}

impl Transport for AxumTransport {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(Message::Text(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        };
        // Already gone if the writer task has stopped
        let _ = self.outbound.send(Message::Close(Some(frame)));
    }
}

/// Handle WebSocket upgrade requests.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebSocketState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection.
///
/// Runs for the lifetime of the connection.
async fn handle_socket(socket: WebSocket, state: WebSocketState) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let close_echo_tx = outbound.clone();

    let channel_id = ChannelId::random();
    let server_socket = state.server.accept(
        channel_id.clone(),
        Arc::new(AxumTransport { outbound }),
        Some("websocket".to_string()),
    );

    // Forward queued frames to the client
    let mut send_task = {
        let channel_id = channel_id.clone();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let close = match &message {
                    Message::Close(frame) => Some(
                        frame
                            .as_ref()
                            .map(|f| (f.code, f.reason.to_string()))
                            .unwrap_or((1000, String::new())),
                    ),
                    _ => None,
                };
                if let Err(e) = sender.send(message).await {
                    tracing::debug!(channel_id = %channel_id, "Send error, closing connection: {}", e);
                    return (ABNORMAL_CLOSURE, e.to_string());
                }
                if let Some(close) = close {
                    return close;
                }
            }
            (1000, String::new())
        })
    };

    // Feed client frames into the socket
    let mut recv_task = {
        let server_socket = Arc::clone(&server_socket);
        tokio::spawn(async move {
            while let Some(result) = receiver.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        server_socket.handle_event(TransportEvent::Message(text));
                    }
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => server_socket.handle_event(TransportEvent::Message(text)),
                        Err(_) => tracing::warn!(
                            channel_id = %server_socket.id(),
                            "Received non-UTF-8 binary message"
                        ),
                    },
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                        // Answered by axum
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(channel_id = %server_socket.id(), "Client sent close frame");
                        return frame
                            .map(|f| (f.code, f.reason.into_owned()))
                            .unwrap_or((1005, String::new()));
                    }
                    Err(e) => {
                        server_socket.handle_event(TransportEvent::Error(e.to_string()));
                        return (ABNORMAL_CLOSURE, e.to_string());
                    }
                }
            }
            (ABNORMAL_CLOSURE, "Connection dropped".to_string())
        })
    };

    // Wait for either task to finish
    let (code, reason) = tokio::select! {
        result = &mut send_task => {
            recv_task.abort();
            result.unwrap_or((ABNORMAL_CLOSURE, "Send task failed".to_string()))
        }
        result = &mut recv_task => {
            let (code, reason) = result.unwrap_or((ABNORMAL_CLOSURE, "Receive task failed".to_string()));
            if code == ABNORMAL_CLOSURE {
                send_task.abort();
            } else {
                // Answer the client's close so it sees a clean shutdown
                let _ = close_echo_tx.send(close_echo(code, &reason));
                if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut send_task).await.is_err() {
                    tracing::debug!(channel_id = %channel_id, "Close echo not flushed in time");
                    send_task.abort();
                }
            }
            (code, reason)
        }
    };

    server_socket.handle_event(TransportEvent::Close { code, reason });
}

/// Close frame answering a client-initiated close.
///
/// 1005 means the client sent no status, so the reply carries none either.
fn close_echo(code: u16, reason: &str) -> Message {
    if code == 1005 {
        return Message::Close(None);
    }
    Message::Close(Some(CloseFrame {
        code,
        reason: Cow::Owned(reason.to_string()),
    }))
}

/// Create axum router for the WebSocket endpoint at `config.prefix`.
///
/// # Example
///
/// ```ignore
/// let app = websocket_router(&config.server).with_state(WebSocketState::new(server));
/// ```
pub fn websocket_router(config: &ServerConfig) -> axum::Router<WebSocketState> {
    use axum::routing::get;

    axum::Router::new()
        .route(&config.prefix, get(ws_handler))
        .layer(TraceLayer::new_for_http())
}
