//! Wire envelopes exchanged over a single transport connection.
//!
//! The two directions use different shapes, kept as-is so existing
//! peers interoperate:
//!
//! - Client → Server: tagged by `type`
//!   (`message`, `subscription`, `emit`).
//! - Server → Client: `{event_name, data}` with no tag.
//!
//! One serialized envelope is one transport frame. There is no batching.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{ChannelError, DecodeError};
use super::events::MESSAGE_EVENT;

// ============================================
// Decoded form
// ============================================

/// What an inbound frame asks the receiving channel to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Invoke listeners for `name` with positional `args`.
    Event { name: String, args: Vec<Value> },

    /// The peer announced it listens for this event. Advisory only.
    Subscription(String),
}

impl Inbound {
    fn single(name: impl Into<String>, data: Value) -> Self {
        Inbound::Event {
            name: name.into(),
            args: vec![data],
        }
    }
}

/// A frame shape that can be decoded on the receiving side.
pub trait InboundFrame {
    fn decode(raw: &str) -> Result<Inbound, DecodeError>;
}

// ============================================
// Client → Server
// ============================================

/// All envelope kinds a client can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEnvelope {
    /// Single-payload message. Without `event_name` it lands on the
    /// receiver's `message` listeners.
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_name: Option<String>,
        #[serde(default)]
        data: Value,
    },

    /// Advisory notice that the client listens for `event_name`.
    Subscription { event_name: String },

    /// Multi-argument emission, spread positionally into listeners.
    Emit {
        event_name: String,
        #[serde(default)]
        args: Vec<Value>,
    },
}

const CLIENT_KINDS: &[&str] = &["message", "subscription", "emit"];

impl ClientEnvelope {
    /// Untyped payload for the peer's `message` listeners.
    pub fn raw(data: Value) -> Self {
        ClientEnvelope::Message {
            event_name: None,
            data,
        }
    }

    /// Typed payload for listeners of `event_name`.
    pub fn event(event_name: impl Into<String>, data: Value) -> Self {
        ClientEnvelope::Message {
            event_name: Some(event_name.into()),
            data,
        }
    }

    pub fn subscription(event_name: impl Into<String>) -> Self {
        ClientEnvelope::Subscription {
            event_name: event_name.into(),
        }
    }

    pub fn emit_args(event_name: impl Into<String>, args: Vec<Value>) -> Self {
        ClientEnvelope::Emit {
            event_name: event_name.into(),
            args,
        }
    }

    /// Serialize to a single transport frame.
    pub fn encode(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(ChannelError::Encode)
    }

    /// Maps the legacy spread form `{type: <event>, args: [...]}` onto
    /// an explicit `Emit`. Older clients overload `type` as the event name.
    fn from_legacy(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let event_name = object.get("type")?.as_str()?;
        let args = object.get("args")?.as_array()?;
        Some(ClientEnvelope::Emit {
            event_name: event_name.to_string(),
            args: args.clone(),
        })
    }
}

impl From<ClientEnvelope> for Inbound {
    fn from(envelope: ClientEnvelope) -> Self {
        match envelope {
            ClientEnvelope::Message {
                event_name: Some(name),
                data,
            } => Inbound::single(name, data),
            ClientEnvelope::Message {
                event_name: None,
                data,
            } => Inbound::single(MESSAGE_EVENT, data),
            ClientEnvelope::Subscription { event_name } => Inbound::Subscription(event_name),
            ClientEnvelope::Emit { event_name, args } => Inbound::Event {
                name: event_name,
                args,
            },
        }
    }
}

impl InboundFrame for ClientEnvelope {
    fn decode(raw: &str) -> Result<Inbound, DecodeError> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }

        match serde_json::from_value::<ClientEnvelope>(value.clone()) {
            Ok(envelope) => Ok(envelope.into()),
            Err(err) => {
                let kind = value.get("type").and_then(Value::as_str);
                // Legacy spread frames may reuse any kind name except `message`
                if kind.is_some_and(|kind| kind != MESSAGE_EVENT) {
                    if let Some(legacy) = ClientEnvelope::from_legacy(&value) {
                        return Ok(legacy.into());
                    }
                }
                match kind {
                    Some(kind) if !CLIENT_KINDS.contains(&kind) => {
                        Err(DecodeError::UnknownType(kind.to_string()))
                    }
                    _ => Err(DecodeError::Malformed(err)),
                }
            }
        }
    }
}

// ============================================
// Server → Client
// ============================================

/// The only envelope shape a server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEnvelope {
    pub event_name: String,
    pub data: Value,
}

impl ServerEnvelope {
    pub fn new(event_name: impl Into<String>, data: Value) -> Self {
        Self {
            event_name: event_name.into(),
            data,
        }
    }

    /// Untyped payload, delivered to the client's `message` listeners.
    pub fn raw(data: Value) -> Self {
        Self::new(MESSAGE_EVENT, data)
    }

    /// Serialize to a single transport frame.
    pub fn encode(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(ChannelError::Encode)
    }
}

impl InboundFrame for ServerEnvelope {
    /// Objects carrying a string `event_name` dispatch their `data` to that
    /// event. Any other JSON value goes whole to `message`.
    fn decode(raw: &str) -> Result<Inbound, DecodeError> {
        let mut value: Value = serde_json::from_str(raw)?;

        let event_name = value
            .get("event_name")
            .and_then(Value::as_str)
            .map(str::to_string);

        match event_name {
            Some(name) => {
                let data = value
                    .as_object_mut()
                    .and_then(|object| object.remove("data"))
                    .unwrap_or(Value::Null);
                Ok(Inbound::single(name, data))
            }
            None => Ok(Inbound::single(MESSAGE_EVENT, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_message_serializes_with_type_tag() {
        let frame = ClientEnvelope::event("x", json!({"a": 1})).encode().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({"type": "message", "event_name": "x", "data": {"a": 1}})
        );
    }

    #[test]
    fn raw_message_omits_event_name() {
        let frame = ClientEnvelope::raw(json!("hi")).encode().unwrap();
        assert_eq!(frame, r#"{"type":"message","data":"hi"}"#);
    }

    #[test]
    fn subscription_serializes() {
        let frame = ClientEnvelope::subscription("ping").encode().unwrap();
        assert_eq!(frame, r#"{"type":"subscription","event_name":"ping"}"#);
    }

    #[test]
    fn typed_message_decodes_to_named_event() {
        let frame = ClientEnvelope::event("x", json!({"a": 1})).encode().unwrap();
        let inbound = ClientEnvelope::decode(&frame).unwrap();
        assert_eq!(
            inbound,
            Inbound::Event {
                name: "x".into(),
                args: vec![json!({"a": 1})]
            }
        );
    }

    #[test]
    fn untyped_message_decodes_to_message_event() {
        let frame = ClientEnvelope::raw(json!("hi")).encode().unwrap();
        let inbound = ClientEnvelope::decode(&frame).unwrap();
        assert_eq!(
            inbound,
            Inbound::Event {
                name: "message".into(),
                args: vec![json!("hi")]
            }
        );
    }

    #[test]
    fn message_without_data_decodes_to_null() {
        let inbound = ClientEnvelope::decode(r#"{"type":"message","event_name":"tick"}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Event {
                name: "tick".into(),
                args: vec![Value::Null]
            }
        );
    }

    #[test]
    fn subscription_decodes_to_notice() {
        let inbound =
            ClientEnvelope::decode(r#"{"type":"subscription","event_name":"score"}"#).unwrap();
        assert_eq!(inbound, Inbound::Subscription("score".into()));
    }

    #[test]
    fn explicit_emit_spreads_args() {
        let inbound = ClientEnvelope::decode(
            r#"{"type":"emit","event_name":"move","args":[1,"north",true]}"#,
        )
        .unwrap();
        assert_eq!(
            inbound,
            Inbound::Event {
                name: "move".into(),
                args: vec![json!(1), json!("north"), json!(true)]
            }
        );
    }

    #[test]
    fn legacy_spread_form_uses_type_as_event_name() {
        let inbound = ClientEnvelope::decode(r#"{"type":"move","args":[3,4]}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Event {
                name: "move".into(),
                args: vec![json!(3), json!(4)]
            }
        );
    }

    #[test]
    fn legacy_spread_form_may_reuse_kind_names() {
        let inbound = ClientEnvelope::decode(r#"{"type":"emit","args":[1,2]}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Event {
                name: "emit".into(),
                args: vec![json!(1), json!(2)]
            }
        );

        let inbound = ClientEnvelope::decode(r#"{"type":"subscription","args":["x"]}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Event {
                name: "subscription".into(),
                args: vec![json!("x")]
            }
        );
    }

    #[test]
    fn unknown_type_without_args_is_rejected() {
        let err = ClientEnvelope::decode(r#"{"type":"close"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownType(kind) if kind == "close"));
    }

    #[test]
    fn known_type_with_bad_fields_is_malformed() {
        let err = ClientEnvelope::decode(r#"{"type":"subscription"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn unparseable_frame_is_malformed() {
        let err = ClientEnvelope::decode("not json at all").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn non_object_frame_is_rejected() {
        let err = ClientEnvelope::decode("[1,2]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject));
    }

    #[test]
    fn server_envelope_has_no_type_tag() {
        let frame = ServerEnvelope::new("ping", json!({"n": 1})).encode().unwrap();
        assert_eq!(frame, r#"{"event_name":"ping","data":{"n":1}}"#);
    }

    #[test]
    fn server_write_targets_message_event() {
        let frame = ServerEnvelope::raw(json!([1, 2])).encode().unwrap();
        let inbound = ServerEnvelope::decode(&frame).unwrap();
        assert_eq!(
            inbound,
            Inbound::Event {
                name: "message".into(),
                args: vec![json!([1, 2])]
            }
        );
    }

    #[test]
    fn server_frame_without_event_name_goes_whole_to_message() {
        let inbound = ServerEnvelope::decode(r#"{"score": 10}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Event {
                name: "message".into(),
                args: vec![json!({"score": 10})]
            }
        );
    }

    #[test]
    fn server_frame_scalar_goes_to_message() {
        let inbound = ServerEnvelope::decode(r#""hello""#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Event {
                name: "message".into(),
                args: vec![json!("hello")]
            }
        );
    }

    #[test]
    fn server_frame_garbage_is_malformed() {
        assert!(matches!(
            ServerEnvelope::decode("{event_name:"),
            Err(DecodeError::Malformed(_))
        ));
    }
}
