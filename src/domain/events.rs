//! Reserved local event names.
//!
//! These names have built-in meaning on every channel and never trigger
//! a subscription notice to the peer.

/// Emitted once when the transport opens, before queued sends flush.
pub const CONNECT_EVENT: &str = "connect";

/// Receives untyped payloads (`send` / `write`).
pub const MESSAGE_EVENT: &str = "message";

/// Emitted with `(code, reason)` when the transport closes.
pub const CLOSE_EVENT: &str = "close";

/// Emitted with the error detail when the transport reports an error.
pub const ERROR_EVENT: &str = "error";

pub const RESERVED_EVENTS: &[&str] = &[CONNECT_EVENT, MESSAGE_EVENT, CLOSE_EVENT, ERROR_EVENT];

/// Returns true for names with built-in local meaning.
pub fn is_reserved(event_name: &str) -> bool {
    RESERVED_EVENTS.contains(&event_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_are_recognized() {
        for name in ["connect", "message", "close", "error"] {
            assert!(is_reserved(name), "{name} should be reserved");
        }
    }

    #[test]
    fn custom_names_are_not_reserved() {
        assert!(!is_reserved("ping"));
        assert!(!is_reserved("Message"));
        assert!(!is_reserved(""));
    }
}
