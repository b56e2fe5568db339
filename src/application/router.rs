//! Inbound envelope dispatch.
//!
//! The same router runs on both ends of a connection; the frame type
//! parameter selects which envelope shape is expected on the wire.

use std::marker::PhantomData;

use serde_json::Value;

use crate::domain::{DecodeError, Inbound, InboundFrame};

use super::listeners::ListenerRegistry;

/// Result of routing one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Listeners of `event` were invoked (`listeners` may be zero).
    Dispatched { event: String, listeners: usize },

    /// The peer announced a subscription; nothing was invoked.
    Subscription(String),
}

/// Decodes inbound frames of shape `F` and invokes local listeners.
pub struct EventRouter<F> {
    listeners: ListenerRegistry,
    _frame: PhantomData<fn() -> F>,
}

impl<F: InboundFrame> EventRouter<F> {
    pub fn new() -> Self {
        Self {
            listeners: ListenerRegistry::new(),
            _frame: PhantomData,
        }
    }

    /// The local listener table.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Decode and dispatch one raw frame.
    ///
    /// A `DecodeError` means nothing was dispatched. Callers log and drop it.
    pub fn route(&self, raw: &str) -> Result<Routed, DecodeError> {
        let inbound = F::decode(raw)?;
        Ok(self.dispatch(inbound))
    }

    /// Dispatch an already-decoded envelope.
    pub fn dispatch(&self, inbound: Inbound) -> Routed {
        match inbound {
            Inbound::Event { name, args } => {
                let listeners = self.listeners.emit(&name, &args);
                if listeners == 0 {
                    tracing::trace!(event = %name, "No listeners for inbound event");
                }
                Routed::Dispatched {
                    event: name,
                    listeners,
                }
            }
            Inbound::Subscription(name) => Routed::Subscription(name),
        }
    }

    /// Fire a local-only event such as `connect` or `close`.
    pub fn emit_local(&self, event_name: &str, args: &[Value]) -> usize {
        self.listeners.emit(event_name, args)
    }
}

impl<F: InboundFrame> Default for EventRouter<F> {
    fn default() -> Self {
        Self::new()
    }
}
