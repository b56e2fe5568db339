//! Room membership registry for one server instance.
//!
//! Rooms are named broadcast groups of channel ids. Membership is kept in
//! both directions under one lock:
//!
//! ```text
//! rooms:        lobby → {a, b}      game1 → {a}
//! memberships:  a → {lobby, game1}  b → {lobby}
//! ```
//!
//! A room exists exactly while it has at least one member. Every
//! operation leaves both maps agreeing with each other.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{ChannelId, RoomError};

#[derive(Debug)]
struct RegistryState<C> {
    /// Live channels, keyed by transport-assigned id.
    channels: HashMap<ChannelId, C>,
    /// Room name → member ids.
    rooms: HashMap<String, HashSet<ChannelId>>,
    /// Channel id → joined room names, for O(rooms) cleanup on disconnect.
    memberships: HashMap<ChannelId, HashSet<String>>,
}

impl<C> RegistryState<C> {
    fn leave(&mut self, room: &str, channel_id: &ChannelId) -> Result<(), RoomError> {
        let members = self
            .rooms
            .get_mut(room)
            .ok_or_else(|| RoomError::RoomNotFound(room.to_string()))?;

        if !members.remove(channel_id) {
            return Err(RoomError::NotAMember {
                room: room.to_string(),
                channel: channel_id.clone(),
            });
        }
        if members.is_empty() {
            self.rooms.remove(room);
            tracing::debug!(room, "Room empty, removed");
        }

        if let Some(joined) = self.memberships.get_mut(channel_id) {
            joined.remove(room);
            if joined.is_empty() {
                self.memberships.remove(channel_id);
            }
        }
        Ok(())
    }
}

/// Live-channel map plus room membership, generic over the channel handle.
pub struct RoomRegistry<C> {
    state: RwLock<RegistryState<C>>,
}

impl<C: Clone> RoomRegistry<C> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                channels: HashMap::new(),
                rooms: HashMap::new(),
                memberships: HashMap::new(),
            }),
        }
    }

    /// Add a live channel. Returns the handle previously stored under `id`.
    pub fn register(&self, id: ChannelId, channel: C) -> Option<C> {
        self.write().channels.insert(id, channel)
    }

    /// Look up a live channel.
    pub fn channel(&self, id: &ChannelId) -> Option<C> {
        self.read().channels.get(id).cloned()
    }

    pub fn contains_channel(&self, id: &ChannelId) -> bool {
        self.read().channels.contains_key(id)
    }

    /// Snapshot of every live channel.
    pub fn channels(&self) -> Vec<(ChannelId, C)> {
        self.read()
            .channels
            .iter()
            .map(|(id, channel)| (id.clone(), channel.clone()))
            .collect()
    }

    pub fn channel_count(&self) -> usize {
        self.read().channels.len()
    }

    /// Add `channel_id` to `room`, creating the room on first join.
    ///
    /// Idempotent. Returns true if the membership is new; false if it
    /// already existed or the channel is not live.
    pub fn join(&self, room: &str, channel_id: &ChannelId) -> bool {
        let mut state = self.write();
        if !state.channels.contains_key(channel_id) {
            tracing::debug!(room, channel_id = %channel_id, "Join ignored for unknown channel");
            return false;
        }

        let added = state
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(channel_id.clone());
        state
            .memberships
            .entry(channel_id.clone())
            .or_default()
            .insert(room.to_string());

        if added {
            tracing::debug!(room, channel_id = %channel_id, "Joined room");
        }
        added
    }

    /// Remove `channel_id` from `room`, reporting why if nothing changed.
    pub fn try_leave(&self, room: &str, channel_id: &ChannelId) -> Result<(), RoomError> {
        self.write().leave(room, channel_id)?;
        tracing::debug!(room, channel_id = %channel_id, "Left room");
        Ok(())
    }

    /// Remove `channel_id` from `room`. False if it was not a member.
    pub fn leave(&self, room: &str, channel_id: &ChannelId) -> bool {
        self.try_leave(room, channel_id).is_ok()
    }

    /// Drop a channel from every room it joined and from the live map.
    ///
    /// Safe to call more than once; later calls find nothing to remove.
    pub fn remove_channel(&self, channel_id: &ChannelId) -> Option<C> {
        let mut state = self.write();

        let joined: Vec<String> = state
            .memberships
            .get(channel_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();
        for room in &joined {
            if let Err(e) = state.leave(room, channel_id) {
                tracing::warn!(room = %room, channel_id = %channel_id, error = %e, "Inconsistent membership");
            }
        }
        state.memberships.remove(channel_id);

        let removed = state.channels.remove(channel_id);
        if removed.is_some() {
            tracing::debug!(channel_id = %channel_id, rooms = joined.len(), "Channel removed");
        }
        removed
    }

    /// Snapshot of a room's member ids. Empty if the room does not exist.
    pub fn members(&self, room: &str) -> Vec<ChannelId> {
        self.read()
            .rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of a room's member handles, for fan-out.
    pub fn member_channels(&self, room: &str) -> Vec<(ChannelId, C)> {
        let state = self.read();
        state
            .rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| state.channels.get(id).map(|c| (id.clone(), c.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_member(&self, room: &str, channel_id: &ChannelId) -> bool {
        self.read()
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(channel_id))
    }

    /// Rooms `channel_id` currently belongs to.
    pub fn rooms_of(&self, channel_id: &ChannelId) -> Vec<String> {
        self.read()
            .memberships
            .get(channel_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_exists(&self, room: &str) -> bool {
        self.read().rooms.contains_key(room)
    }

    /// Names of every existing (non-empty) room.
    pub fn room_names(&self) -> Vec<String> {
        self.read().rooms.keys().cloned().collect()
    }

    pub fn room_count(&self) -> usize {
        self.read().rooms.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState<C>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState<C>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Clone> Default for RoomRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn registry_with(ids: &[&str]) -> RoomRegistry<()> {
        let registry = RoomRegistry::new();
        for id in ids {
            registry.register(ChannelId::from(*id), ());
        }
        registry
    }

    fn id(s: &str) -> ChannelId {
        ChannelId::from(s)
    }

    /// Both directions of the membership map agree and no room is empty.
    fn assert_consistent<C>(registry: &RoomRegistry<C>) {
        let state = registry.state.read().unwrap();
        for (room, members) in &state.rooms {
            assert!(!members.is_empty(), "room {room} is empty but exists");
            for member in members {
                assert!(
                    state
                        .memberships
                        .get(member)
                        .is_some_and(|rooms| rooms.contains(room)),
                    "{member} in {room} but room missing from its set"
                );
            }
        }
        for (member, rooms) in &state.memberships {
            assert!(!rooms.is_empty(), "{member} has an empty room set");
            for room in rooms {
                assert!(
                    state.rooms.get(room).is_some_and(|m| m.contains(member)),
                    "{room} listed for {member} but not in room members"
                );
            }
        }
    }

    #[test]
    fn join_creates_room_if_not_exists() {
        let registry = registry_with(&["a"]);

        assert!(registry.join("lobby", &id("a")));

        assert!(registry.room_exists("lobby"));
        assert_eq!(registry.members("lobby"), vec![id("a")]);
        assert_eq!(registry.rooms_of(&id("a")), vec!["lobby".to_string()]);
        assert_consistent(&registry);
    }

    #[test]
    fn join_is_idempotent() {
        let registry = registry_with(&["a"]);

        assert!(registry.join("lobby", &id("a")));
        assert!(!registry.join("lobby", &id("a")));

        assert_eq!(registry.members("lobby").len(), 1);
        assert_eq!(registry.rooms_of(&id("a")).len(), 1);
    }

    #[test]
    fn join_ignores_unknown_channel() {
        let registry = registry_with(&[]);

        assert!(!registry.join("lobby", &id("ghost")));
        assert!(!registry.room_exists("lobby"));
    }

    #[test]
    fn leave_last_member_deletes_room() {
        let registry = registry_with(&["a"]);
        registry.join("lobby", &id("a"));

        assert!(registry.leave("lobby", &id("a")));

        assert!(!registry.room_exists("lobby"));
        assert!(registry.rooms_of(&id("a")).is_empty());
        assert_consistent(&registry);
    }

    #[test]
    fn leave_keeps_room_with_remaining_members() {
        let registry = registry_with(&["a", "b"]);
        registry.join("lobby", &id("a"));
        registry.join("lobby", &id("b"));

        assert!(registry.leave("lobby", &id("a")));

        assert_eq!(registry.members("lobby"), vec![id("b")]);
        assert_consistent(&registry);
    }

    #[test]
    fn leave_reports_missing_room_and_non_member() {
        let registry = registry_with(&["a", "b"]);
        registry.join("lobby", &id("a"));

        assert_eq!(
            registry.try_leave("nowhere", &id("a")),
            Err(RoomError::RoomNotFound("nowhere".into()))
        );
        assert_eq!(
            registry.try_leave("lobby", &id("b")),
            Err(RoomError::NotAMember {
                room: "lobby".into(),
                channel: id("b")
            })
        );
        assert!(!registry.leave("lobby", &id("b")));
        assert_eq!(registry.members("lobby"), vec![id("a")]);
    }

    #[test]
    fn remove_channel_cascades_through_rooms() {
        let registry = registry_with(&["a", "b"]);
        registry.join("lobby", &id("a"));
        registry.join("game1", &id("a"));
        registry.join("lobby", &id("b"));

        assert!(registry.remove_channel(&id("a")).is_some());

        assert!(!registry.is_member("lobby", &id("a")));
        assert!(!registry.room_exists("game1"));
        assert_eq!(registry.members("lobby"), vec![id("b")]);
        assert!(!registry.contains_channel(&id("a")));
        assert_consistent(&registry);
    }

    #[test]
    fn remove_channel_twice_is_harmless() {
        let registry = registry_with(&["a", "b"]);
        registry.join("lobby", &id("a"));
        registry.join("lobby", &id("b"));

        registry.remove_channel(&id("a"));
        let rooms_after_once = registry.room_names();
        assert!(registry.remove_channel(&id("a")).is_none());

        assert_eq!(registry.room_names(), rooms_after_once);
        assert_eq!(registry.members("lobby"), vec![id("b")]);
        assert_eq!(registry.channel_count(), 1);
    }

    #[test]
    fn member_channels_skips_nothing_live() {
        let registry: RoomRegistry<u32> = RoomRegistry::new();
        registry.register(id("a"), 1);
        registry.register(id("b"), 2);
        registry.join("lobby", &id("a"));
        registry.join("lobby", &id("b"));

        let mut handles: Vec<u32> = registry
            .member_channels("lobby")
            .into_iter()
            .map(|(_, h)| h)
            .collect();
        handles.sort();

        assert_eq!(handles, vec![1, 2]);
        assert!(registry.member_channels("empty").is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Join(usize, usize),
        Leave(usize, usize),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize, 0..3usize).prop_map(|(c, r)| Op::Join(c, r)),
            (0..4usize, 0..3usize).prop_map(|(c, r)| Op::Leave(c, r)),
            (0..4usize).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn membership_stays_bidirectional(ops in proptest::collection::vec(op(), 0..64)) {
            let channels = ["c0", "c1", "c2", "c3"];
            let rooms = ["lobby", "game1", "game2"];
            let registry = registry_with(&channels);

            for op in ops {
                match op {
                    Op::Join(c, r) => { registry.join(rooms[r], &id(channels[c])); }
                    Op::Leave(c, r) => { registry.leave(rooms[r], &id(channels[c])); }
                    Op::Remove(c) => { registry.remove_channel(&id(channels[c])); }
                }
                assert_consistent(&registry);
            }
        }

        #[test]
        fn join_then_leave_restores_absence(c in 0..4usize, r in 0..3usize) {
            let channels = ["c0", "c1", "c2", "c3"];
            let rooms = ["lobby", "game1", "game2"];
            let registry = registry_with(&channels);

            registry.join(rooms[r], &id(channels[c]));
            prop_assert!(registry.leave(rooms[r], &id(channels[c])));

            prop_assert!(!registry.is_member(rooms[r], &id(channels[c])));
            prop_assert!(registry.rooms_of(&id(channels[c])).is_empty());
            prop_assert!(!registry.room_exists(rooms[r]));
        }
    }
}
