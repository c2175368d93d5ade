//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use uuid::Uuid;

use crate::models::{Room, RoomPlayer};

/// Validate that a room's state is internally consistent
pub fn assert_room_invariants(room: &Room) {
    debug_assert!(
        !room.code.trim().is_empty(),
        "Room {} has empty code",
        room.id
    );

    debug_assert!(
        !room.name.trim().is_empty(),
        "Room {} has empty name",
        room.id
    );

    debug_assert!(
        room.host_id != Uuid::nil(),
        "Room {} has nil host_id",
        room.id
    );

    debug_assert!(
        (0..=room.max_players).contains(&room.current_players),
        "Room {} counts {} players against capacity {}",
        room.id,
        room.current_players,
        room.max_players
    );

    // Started rooms must remember when they started
    debug_assert!(
        !(room.status == crate::models::RoomStatus::Playing && room.started_at.is_none()),
        "Room {} is playing but has no started_at",
        room.id
    );
}

/// Validate that an active roster agrees with its room
pub fn assert_roster_invariants(room: &Room, roster: &[RoomPlayer]) {
    let host_count = roster.iter().filter(|p| p.is_host()).count();
    debug_assert!(
        host_count <= 1,
        "Room {} has {} hosts, expected 0 or 1",
        room.id,
        host_count
    );

    // The host row, when present, must name the same user the room does
    if let Some(host) = roster.iter().find(|p| p.is_host()) {
        debug_assert!(
            host.user_id == room.host_id,
            "Room {} names host {} but roster marks {}",
            room.id,
            room.host_id,
            host.user_id
        );
    }

    debug_assert!(
        roster.iter().all(|p| p.room_id == room.id && p.is_active()),
        "Room {} roster contains foreign or departed rows",
        room.id
    );

    debug_assert!(
        roster.len() as i64 == room.current_players,
        "Room {} stores current_players {} but roster has {}",
        room.id,
        room.current_players,
        roster.len()
    );
}

/// Validate that a membership row is well formed
pub fn assert_membership_invariants(player: &RoomPlayer) {
    debug_assert!(
        player.user_id != Uuid::nil(),
        "Membership {} has nil user_id",
        player.id
    );

    debug_assert!(
        player.room_id != Uuid::nil(),
        "Membership {} has nil room_id",
        player.id
    );
}

/// Validate that a user ID is not nil
pub fn assert_user_id_valid(user_id: Uuid, context: &str) {
    debug_assert!(
        user_id != Uuid::nil(),
        "Nil user_id in context: {}",
        context
    );
}

/// Validate that a room ID is not nil
pub fn assert_room_id_valid(room_id: Uuid, context: &str) {
    debug_assert!(
        room_id != Uuid::nil(),
        "Nil room_id in context: {}",
        context
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlayerRole;

    fn make_room() -> Room {
        Room::new(
            "AB12CD".to_string(),
            "Test Room".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_valid_room() {
        let room = make_room();
        assert_room_invariants(&room);
    }

    #[test]
    fn test_roster_with_host() {
        let mut room = make_room();
        room.current_players = 2;
        let roster = vec![
            RoomPlayer::new(room.id, room.host_id, "ada".into(), PlayerRole::Host),
            RoomPlayer::new(room.id, Uuid::new_v4(), "bert".into(), PlayerRole::Player),
        ];
        assert_roster_invariants(&room, &roster);
    }

    #[test]
    fn test_valid_membership() {
        let player = RoomPlayer::new(Uuid::new_v4(), Uuid::new_v4(), "ada".into(), PlayerRole::Player);
        assert_membership_invariants(&player);
    }

    #[test]
    #[should_panic(expected = "hosts")]
    fn test_two_hosts_rejected() {
        let mut room = make_room();
        room.current_players = 2;
        let roster = vec![
            RoomPlayer::new(room.id, room.host_id, "ada".into(), PlayerRole::Host),
            RoomPlayer::new(room.id, Uuid::new_v4(), "bert".into(), PlayerRole::Host),
        ];
        assert_roster_invariants(&room, &roster);
    }
}
