//! Local listener table: event name → ordered callbacks.
//!
//! Duplicates are permitted and fire in registration order. Dispatch
//! works on a snapshot of the callbacks so a listener may register,
//! unregister, join rooms or send without deadlocking or invalidating
//! the iteration in progress.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::domain::ListenerId;

/// Callback invoked with the event's positional arguments.
pub type Listener = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Registry of local listeners for one channel.
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a callback for `event_name`.
    pub fn add(&self, event_name: &str, listener: Listener) -> ListenerId {
        let id = ListenerId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write()
            .entry(event_name.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Removes one registration. Returns false if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.write();
        let mut removed = false;
        listeners.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    /// Removes every callback for `event_name`, returning how many there were.
    pub fn remove_all(&self, event_name: &str) -> usize {
        self.write()
            .remove(event_name)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Drops every registration.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of callbacks registered under `event_name`.
    pub fn listener_count(&self, event_name: &str) -> usize {
        self.read().get(event_name).map(Vec::len).unwrap_or(0)
    }

    /// Event names with at least one callback.
    pub fn event_names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Invokes every callback for `event_name` with `args`.
    ///
    /// Returns the number of callbacks invoked; zero is not an error.
    pub fn emit(&self, event_name: &str, args: &[Value]) -> usize {
        // Snapshot so callbacks run without the lock held
        let snapshot: Vec<Listener> = self
            .read()
            .get(event_name)
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in &snapshot {
            listener(args);
        }
        snapshot.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<(ListenerId, Listener)>>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<(ListenerId, Listener)>>> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<String, usize> = self
            .read()
            .iter()
            .map(|(name, entries)| (name.clone(), entries.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}
