//! Client side of a connection.
//!
//! Wraps one transport, frames outbound calls as typed client envelopes
//! and tells the server which custom events it listens for.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::domain::{
    is_reserved, ChannelError, ChannelState, ClientEnvelope, ListenerId, ServerEnvelope,
};
use crate::ports::{Transport, TransportEvent};

use super::channel::Channel;

/// A client connection.
///
/// Created in the `Connecting` state: anything sent before the transport
/// opens is queued and flushed, in order, right after `connect` fires.
///
/// # Example
///
/// ```ignore
/// let client = Client::new(transport);
/// client.on("ping", |args| println!("ping: {:?}", args));
/// client.emit("join", json!({"room": "lobby"}))?;
/// ```
pub struct Client {
    channel: Channel<ServerEnvelope>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            channel: Channel::new(None, transport),
        }
    }

    /// Register a listener.
    ///
    /// Non-reserved names also send a `subscription` notice to the server.
    pub fn on<L>(&self, event_name: &str, listener: L) -> ListenerId
    where
        L: Fn(&[Value]) + Send + Sync + 'static,
    {
        if !is_reserved(event_name) {
            if let Err(e) = self.send_envelope(&ClientEnvelope::subscription(event_name)) {
                tracing::debug!(event = event_name, error = %e, "Subscription notice not sent");
            }
        }
        self.channel
            .router()
            .listeners()
            .add(event_name, Arc::new(listener))
    }

    /// Unregister one listener. Returns false if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.channel.router().listeners().remove(id)
    }

    /// Unregister every listener for `event_name`.
    pub fn remove_all_listeners(&self, event_name: &str) -> usize {
        self.channel.router().listeners().remove_all(event_name)
    }

    /// Untyped payload for the server's `message` listeners.
    pub fn send(&self, data: impl Serialize) -> Result<(), ChannelError> {
        let data = serde_json::to_value(data).map_err(ChannelError::Encode)?;
        self.send_envelope(&ClientEnvelope::raw(data))
    }

    /// Typed payload for the server's `event_name` listeners.
    pub fn emit(&self, event_name: &str, data: impl Serialize) -> Result<(), ChannelError> {
        let data = serde_json::to_value(data).map_err(ChannelError::Encode)?;
        self.send_envelope(&ClientEnvelope::event(event_name, data))
    }

    /// Multi-argument emission, spread positionally on the server.
    pub fn emit_args(&self, event_name: &str, args: Vec<Value>) -> Result<(), ChannelError> {
        self.send_envelope(&ClientEnvelope::emit_args(event_name, args))
    }

    /// Ask the transport to close with a normal closure code.
    pub fn close(&self) {
        self.channel.close(1000, "Normal closure");
    }

    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn protocol(&self) -> Option<String> {
        self.channel.protocol()
    }

    pub fn last_error(&self) -> Option<String> {
        self.channel.last_error()
    }

    pub fn pending_len(&self) -> usize {
        self.channel.pending_len()
    }

    /// Feed one transport event. Called by the transport adapter.
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Open { protocol } => self.channel.handle_open(protocol),
            TransportEvent::Message(raw) => {
                self.channel.handle_message(&raw);
            }
            TransportEvent::Close { code, reason } => {
                self.channel.handle_close(code, &reason);
            }
            TransportEvent::Error(detail) => self.channel.handle_error(&detail),
        }
    }

    fn send_envelope(&self, envelope: &ClientEnvelope) -> Result<(), ChannelError> {
        self.channel.send_frame(envelope.encode()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryTransport;
    use serde_json::json;
    use std::sync::Mutex;

    fn client() -> (Arc<InMemoryTransport>, Client) {
        let transport = Arc::new(InMemoryTransport::new());
        let client = Client::new(transport.clone());
        (transport, client)
    }

    #[test]
    fn custom_listener_sends_subscription_notice() {
        let (transport, client) = client();
        client.handle_event(TransportEvent::Open { protocol: None });

        client.on("score", |_| {});

        assert_eq!(
            transport.sent_values(),
            vec![json!({"type": "subscription", "event_name": "score"})]
        );
    }

    #[test]
    fn reserved_listeners_stay_local() {
        let (transport, client) = client();
        client.handle_event(TransportEvent::Open { protocol: None });

        for name in ["connect", "message", "close", "error"] {
            client.on(name, |_| {});
        }

        assert!(transport.sent_frames().is_empty());
    }

    #[test]
    fn early_sends_flush_after_connect_in_order() {
        let (transport, client) = client();

        client.on("ping", |_| {});
        client.emit("hello", json!({"n": 1})).unwrap();
        client.send("raw").unwrap();

        assert!(transport.sent_frames().is_empty());
        client.handle_event(TransportEvent::Open {
            protocol: Some("websocket".into()),
        });

        assert_eq!(
            transport.sent_values(),
            vec![
                json!({"type": "subscription", "event_name": "ping"}),
                json!({"type": "message", "event_name": "hello", "data": {"n": 1}}),
                json!({"type": "message", "data": "raw"}),
            ]
        );
        assert_eq!(client.state(), ChannelState::Open);
        assert_eq!(client.protocol().as_deref(), Some("websocket"));
    }

    #[test]
    fn emit_args_uses_explicit_multi_argument_form() {
        let (transport, client) = client();
        client.handle_event(TransportEvent::Open { protocol: None });

        client
            .emit_args("move", vec![json!(1), json!("up")])
            .unwrap();

        assert_eq!(
            transport.sent_values(),
            vec![json!({"type": "emit", "event_name": "move", "args": [1, "up"]})]
        );
    }

    #[test]
    fn inbound_frames_reach_listeners() {
        let (_, client) = client();
        let pings = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));
        let (p, m) = (Arc::clone(&pings), Arc::clone(&messages));
        client.on("ping", move |args| p.lock().unwrap().push(args[0].clone()));
        client.on("message", move |args| m.lock().unwrap().push(args[0].clone()));

        client.handle_event(TransportEvent::Open { protocol: None });
        client.handle_event(TransportEvent::Message(
            r#"{"event_name":"ping","data":{"n":1}}"#.into(),
        ));
        client.handle_event(TransportEvent::Message("garbage{".into()));
        client.handle_event(TransportEvent::Message(
            r#"{"event_name":"message","data":"hi"}"#.into(),
        ));

        assert_eq!(*pings.lock().unwrap(), vec![json!({"n": 1})]);
        assert_eq!(*messages.lock().unwrap(), vec![json!("hi")]);
    }

    #[test]
    fn off_stops_delivery() {
        let (_, client) = client();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let id = client.on("tick", move |_| *c.lock().unwrap() += 1);
        client.handle_event(TransportEvent::Open { protocol: None });

        let frame = r#"{"event_name":"tick","data":null}"#;
        client.handle_event(TransportEvent::Message(frame.into()));
        assert!(client.off(id));
        client.handle_event(TransportEvent::Message(frame.into()));

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn sends_after_close_report_channel_closed() {
        let (_, client) = client();
        client.handle_event(TransportEvent::Open { protocol: None });
        client.handle_event(TransportEvent::normal_close());

        let err = client.emit("late", 1).unwrap_err();
        assert!(matches!(err, ChannelError::ChannelClosed(_)));
    }

    #[test]
    fn close_listener_gets_code_and_reason() {
        let (_, client) = client();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        client.on("close", move |args| s.lock().unwrap().extend_from_slice(args));

        client.handle_event(TransportEvent::Open { protocol: None });
        client.handle_event(TransportEvent::Close {
            code: 1001,
            reason: "going away".into(),
        });

        assert_eq!(*seen.lock().unwrap(), vec![json!(1001), json!("going away")]);
    }
}
