//! Connection lifecycle state machine.
//!
//! ```text
//! Connecting ──► Open ──► Closed
//!      │                    ▲
//!      └────────────────────┘
//! ```
//!
//! Transport errors are recorded on the channel but do not move it
//! between states; only the transport reporting a close does that.

use std::fmt;

use thiserror::Error;

/// A rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ChannelState,
    pub to: ChannelState,
}

/// Trait for status enums that represent state machines.
///
/// Implementors define valid state transitions and get validated
/// transition methods for free.
pub trait StateMachine: Sized + Copy + PartialEq + fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

/// Lifecycle state of one channel, mirrored from its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    /// Transport handshake in progress; sends are queued.
    #[default]
    Connecting,
    /// Sends pass straight through to the transport.
    Open,
    /// Terminal. Sends fail with `ChannelClosed`.
    Closed,
}

impl ChannelState {
    /// Performs transition with validation.
    pub fn transition_to(self, target: Self) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(InvalidTransition {
                from: self,
                to: target,
            })
        }
    }
}

impl StateMachine for ChannelState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ChannelState::*;
        matches!(
            (self, target),
            (Connecting, Open) | (Connecting, Closed) | (Open, Closed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ChannelState::*;
        match self {
            Connecting => vec![Open, Closed],
            Open => vec![Closed],
            Closed => vec![],
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closed => "closed",
        };
        f.write_str(s)
    }
}
