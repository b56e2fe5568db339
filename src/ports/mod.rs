//! Ports - Interfaces for external collaborators.
//!
//! The only collaborator the connection layer depends on is the
//! streaming transport. Adapters in `crate::adapters` implement it.

mod transport;

pub use transport::{Transport, TransportEvent};
