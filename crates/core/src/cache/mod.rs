//! Best-effort projections of hot lobby state
//!
//! The database stays authoritative; every entry here can be rebuilt from it.
//! Entries expire on a TTL and a stale or missing entry only costs the reader
//! a database round trip.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{RoomStatus, RoomSummary};

struct CachedRoom {
    summary: RoomSummary,
    refreshed_at: Instant,
}

/// In-process cache of room summaries plus the user seating index
pub struct RoomCache {
    ttl: Duration,
    rooms: DashMap<Uuid, CachedRoom>,
    user_index: DashMap<Uuid, Uuid>,
    players: DashMap<Uuid, HashSet<Uuid>>,
}

impl RoomCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            rooms: DashMap::new(),
            user_index: DashMap::new(),
            players: DashMap::new(),
        }
    }

    /// Store a summary; the newest write wins
    pub fn put_room(&self, summary: RoomSummary) {
        self.rooms.insert(
            summary.id,
            CachedRoom {
                summary,
                refreshed_at: Instant::now(),
            },
        );
    }

    /// Fetch a summary, treating expired entries as misses
    pub fn room(&self, id: Uuid) -> Option<RoomSummary> {
        {
            let entry = self.rooms.get(&id)?;
            if entry.refreshed_at.elapsed() <= self.ttl {
                return Some(entry.summary.clone());
            }
        }
        // Entry guard is released before mutating the shard
        self.rooms.remove(&id);
        None
    }

    /// Drop a room and everything pointing at it
    pub fn remove_room(&self, id: Uuid) {
        self.rooms.remove(&id);
        self.players.remove(&id);
        self.user_index.retain(|_, room_id| *room_id != id);
    }

    /// Record that a user now occupies a seat in a room
    pub fn seat(&self, user_id: Uuid, room_id: Uuid) {
        self.user_index.insert(user_id, room_id);
        self.players.entry(room_id).or_default().insert(user_id);
    }

    /// Clear a user's seat in a room. The index is only cleared when it still
    /// points at that room, so a quick rejoin elsewhere is not clobbered.
    pub fn unseat(&self, user_id: Uuid, room_id: Uuid) {
        if let Some(mut seats) = self.players.get_mut(&room_id) {
            seats.remove(&user_id);
        }
        self.user_index
            .remove_if(&user_id, |_, seated_in| *seated_in == room_id);
    }

    /// Which room does this user currently occupy, per the cache?
    pub fn user_room(&self, user_id: Uuid) -> Option<Uuid> {
        self.user_index.get(&user_id).map(|entry| *entry)
    }

    /// Drop a user's index entry regardless of where it points
    pub fn clear_user(&self, user_id: Uuid) {
        self.user_index.remove(&user_id);
    }

    /// Cached seat set for a room
    pub fn seated_users(&self, room_id: Uuid) -> HashSet<Uuid> {
        self.players
            .get(&room_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// All fresh public waiting rooms with a free slot, newest first. An
    /// empty result tells the caller nothing; fall back to the database.
    pub fn waiting_rooms(&self) -> Vec<RoomSummary> {
        self.rooms
            .retain(|_, cached| cached.refreshed_at.elapsed() <= self.ttl);

        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .iter()
            .filter(|entry| {
                let s = &entry.summary;
                s.status == RoomStatus::Waiting && s.is_public && s.has_free_slot()
            })
            .map(|entry| entry.summary.clone())
            .collect();

        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Room;

    fn summary(code: &str) -> RoomSummary {
        RoomSummary::from_room(&Room::new(
            code.into(),
            "Test".into(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        ))
    }

    fn cache() -> RoomCache {
        RoomCache::new(Duration::from_secs(60))
    }

    #[test]
    fn test_put_and_get() {
        let cache = cache();
        let room = summary("AB12CD");
        cache.put_room(room.clone());

        let found = cache.room(room.id).unwrap();
        assert_eq!(found.code, "AB12CD");
        assert!(cache.room(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_newest_write_wins() {
        let cache = cache();
        let mut room = summary("AB12CD");
        cache.put_room(room.clone());

        room.current_players = 3;
        cache.put_room(room.clone());

        assert_eq!(cache.room(room.id).unwrap().current_players, 3);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = RoomCache::new(Duration::from_millis(10));
        let room = summary("AB12CD");
        cache.put_room(room.clone());

        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.room(room.id).is_none());
    }

    #[test]
    fn test_seating_index() {
        let cache = cache();
        let room_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        cache.seat(user_id, room_id);
        assert_eq!(cache.user_room(user_id), Some(room_id));
        assert!(cache.seated_users(room_id).contains(&user_id));

        cache.unseat(user_id, room_id);
        assert_eq!(cache.user_room(user_id), None);
        assert!(cache.seated_users(room_id).is_empty());
    }

    #[test]
    fn test_unseat_does_not_clobber_new_seat() {
        let cache = cache();
        let old_room = Uuid::new_v4();
        let new_room = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        cache.seat(user_id, old_room);
        cache.seat(user_id, new_room);

        // A late departure signal from the old room leaves the new seat alone
        cache.unseat(user_id, old_room);
        assert_eq!(cache.user_room(user_id), Some(new_room));
    }

    #[test]
    fn test_remove_room_clears_indexes() {
        let cache = cache();
        let room = summary("AB12CD");
        let user_id = Uuid::new_v4();

        cache.put_room(room.clone());
        cache.seat(user_id, room.id);
        cache.remove_room(room.id);

        assert!(cache.room(room.id).is_none());
        assert_eq!(cache.user_room(user_id), None);
        assert!(cache.seated_users(room.id).is_empty());
    }

    #[test]
    fn test_waiting_rooms_filters_and_sorts() {
        let cache = cache();

        let newest = summary("NEW000");
        cache.put_room(newest.clone());

        let mut older = summary("OLD000");
        older.created_at = newest.created_at - chrono::Duration::minutes(5);
        cache.put_room(older.clone());

        let mut full = summary("FULL00");
        full.current_players = full.max_players;
        cache.put_room(full);

        let mut private = summary("PRIV00");
        private.is_public = false;
        cache.put_room(private);

        let mut playing = summary("PLAY00");
        playing.status = RoomStatus::Playing;
        cache.put_room(playing);

        let listed = cache.waiting_rooms();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newest.id);
        assert_eq!(listed[1].id, older.id);
    }
}
