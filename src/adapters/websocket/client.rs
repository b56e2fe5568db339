//! WebSocket client transport built on tokio-tungstenite.
//!
//! `connect` returns the `Client` immediately, still `Connecting`. Sends
//! made before the handshake completes are queued by the client and
//! flushed once the connection opens.

use std::borrow::Cow;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::application::Client;
use crate::domain::TransportError;
use crate::ports::{Transport, TransportEvent};

/// Outbound half of a client WebSocket.
struct TungsteniteTransport {
    outbound: mpsc::UnboundedSender<Message>,
}

impl Transport for TungsteniteTransport {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(Message::Text(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        let _ = self.outbound.send(Message::Close(Some(frame)));
    }
}

/// Open a client connection to `url` (`ws://` or `wss://`).
///
/// Must be called from within a tokio runtime. The returned task ends
/// after the client has seen its `close` event.
pub fn connect(url: impl Into<String>) -> (Arc<Client>, JoinHandle<()>) {
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let client = Arc::new(Client::new(Arc::new(TungsteniteTransport { outbound })));
    let task = tokio::spawn(run_connection(url.into(), Arc::clone(&client), outbound_rx));
    (client, task)
}

async fn run_connection(
    url: String,
    client: Arc<Client>,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
) {
    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "WebSocket connect failed");
            client.handle_event(TransportEvent::Error(e.to_string()));
            client.handle_event(TransportEvent::Close {
                code: 1006,
                reason: e.to_string(),
            });
            return;
        }
    };
    tracing::debug!(url = %url, "WebSocket connected");

    let (mut sink, mut source) = stream.split();
    client.handle_event(TransportEvent::Open {
        protocol: Some("websocket".to_string()),
    });

    let (code, reason) = loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else {
                    break (1000, String::new());
                };
                if let Err(e) = sink.send(message).await {
                    client.handle_event(TransportEvent::Error(e.to_string()));
                    break (1006, e.to_string());
                }
            }
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    client.handle_event(TransportEvent::Message(text));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => client.handle_event(TransportEvent::Message(text)),
                    Err(_) => tracing::warn!(url = %url, "Received non-UTF-8 binary message"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((1005, String::new()));
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by tungstenite
                }
                Some(Err(e)) => {
                    client.handle_event(TransportEvent::Error(e.to_string()));
                    break (1006, e.to_string());
                }
                None => break (1006, "Connection dropped".to_string()),
            }
        }
    };

    client.handle_event(TransportEvent::Close { code, reason });
}
