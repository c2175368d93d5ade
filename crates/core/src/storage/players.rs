//! Room membership storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_datetime_opt, parse_role, parse_uuid, OptionalExt};
use crate::error::{Error, Result};
use crate::models::{PlayerRole, RoomPlayer};

const PLAYER_COLUMNS: &str =
    "id, room_id, user_id, username, avatar_url, role, is_ready, joined_at, left_at";

pub struct PlayerStore<'a> {
    conn: &'a Connection,
}

impl<'a> PlayerStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a fresh membership row. The partial unique index on active
    /// memberships rejects users already seated somewhere.
    #[instrument(skip(self, player), fields(room_id = %player.room_id, user_id = %player.user_id))]
    pub fn insert(&self, player: &RoomPlayer) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO room_players (id, room_id, user_id, username, avatar_url, role, \
                 is_ready, joined_at, left_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    player.id.to_string(),
                    player.room_id.to_string(),
                    player.user_id.to_string(),
                    player.username,
                    player.avatar_url,
                    player.role.as_str(),
                    player.is_ready,
                    player.joined_at.to_rfc3339(),
                    player.left_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| map_membership_conflict(player.user_id, e))?;
        Ok(())
    }

    /// Find the membership row for a (room, user) pair, active or departed
    pub fn find(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<RoomPlayer>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAYER_COLUMNS} FROM room_players WHERE room_id = ?1 AND user_id = ?2"
        ))?;

        let player = stmt
            .query_row(
                params![room_id.to_string(), user_id.to_string()],
                player_from_row,
            )
            .optional()?;

        Ok(player)
    }

    pub fn find_active(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<RoomPlayer>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAYER_COLUMNS} FROM room_players \
             WHERE room_id = ?1 AND user_id = ?2 AND left_at IS NULL"
        ))?;

        let player = stmt
            .query_row(
                params![room_id.to_string(), user_id.to_string()],
                player_from_row,
            )
            .optional()?;

        Ok(player)
    }

    /// The user's current seat across all rooms, if any
    #[instrument(skip(self))]
    pub fn find_active_by_user(&self, user_id: Uuid) -> Result<Option<RoomPlayer>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAYER_COLUMNS} FROM room_players \
             WHERE user_id = ?1 AND left_at IS NULL"
        ))?;

        let player = stmt
            .query_row(params![user_id.to_string()], player_from_row)
            .optional()?;

        Ok(player)
    }

    /// Active roster in seating order; the id tiebreak keeps the order stable
    /// when two players joined within the same timestamp granularity.
    #[instrument(skip(self))]
    pub fn list_active(&self, room_id: Uuid) -> Result<Vec<RoomPlayer>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAYER_COLUMNS} FROM room_players \
             WHERE room_id = ?1 AND left_at IS NULL ORDER BY joined_at ASC, id ASC"
        ))?;

        let players = stmt
            .query_map(params![room_id.to_string()], player_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(players)
    }

    pub fn count_active(&self, room_id: Uuid) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM room_players WHERE room_id = ?1 AND left_at IS NULL",
            params![room_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Ready and total counts among active non-spectators. Spectators never
    /// ready up, so they are invisible to both numbers.
    pub fn ready_tally(&self, room_id: Uuid) -> Result<(i64, i64)> {
        let tally = self.conn.query_row(
            "SELECT COUNT(*) FILTER (WHERE is_ready = 1), COUNT(*) \
             FROM room_players \
             WHERE room_id = ?1 AND left_at IS NULL AND role != 'spectator'",
            params![room_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(tally)
    }

    /// Seat a user: reactivate their old row for this room if one exists,
    /// otherwise insert a new one. Identity fields are refreshed and the
    /// ready flag reset on reactivation.
    #[instrument(skip(self, username, avatar_url))]
    pub fn upsert_membership(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        username: &str,
        avatar_url: Option<&str>,
        role: PlayerRole,
    ) -> Result<RoomPlayer> {
        if let Some(previous) = self.find(room_id, user_id)? {
            self.conn
                .execute(
                    "UPDATE room_players SET username = ?1, avatar_url = ?2, role = ?3, \
                     is_ready = 0, joined_at = ?4, left_at = NULL WHERE id = ?5",
                    params![
                        username,
                        avatar_url,
                        role.as_str(),
                        Utc::now().to_rfc3339(),
                        previous.id.to_string(),
                    ],
                )
                .map_err(|e| map_membership_conflict(user_id, e))?;

            return self
                .find_active(room_id, user_id)?
                .ok_or(Error::PlayerNotInRoom { room_id, user_id });
        }

        let mut player = RoomPlayer::new(room_id, user_id, username.to_string(), role);
        player.avatar_url = avatar_url.map(String::from);
        self.insert(&player)?;
        Ok(player)
    }

    /// Mark a membership departed; returns false when no active row matched
    #[instrument(skip(self))]
    pub fn mark_left(&self, room_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE room_players SET left_at = ?1 \
             WHERE room_id = ?2 AND user_id = ?3 AND left_at IS NULL",
            params![at.to_rfc3339(), room_id.to_string(), user_id.to_string()],
        )?;
        Ok(rows > 0)
    }

    /// Clear the whole roster when a room closes, so nobody stays pinned to a
    /// terminal room by the single-seat index.
    #[instrument(skip(self))]
    pub fn mark_all_left(&self, room_id: Uuid, at: DateTime<Utc>) -> Result<i64> {
        let rows = self.conn.execute(
            "UPDATE room_players SET left_at = ?1 WHERE room_id = ?2 AND left_at IS NULL",
            params![at.to_rfc3339(), room_id.to_string()],
        )?;
        Ok(rows as i64)
    }

    pub fn set_role(&self, room_id: Uuid, user_id: Uuid, role: PlayerRole) -> Result<()> {
        self.conn.execute(
            "UPDATE room_players SET role = ?1 \
             WHERE room_id = ?2 AND user_id = ?3 AND left_at IS NULL",
            params![role.as_str(), room_id.to_string(), user_id.to_string()],
        )?;
        Ok(())
    }

    pub fn set_ready(&self, room_id: Uuid, user_id: Uuid, is_ready: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE room_players SET is_ready = ?1 \
             WHERE room_id = ?2 AND user_id = ?3 AND left_at IS NULL",
            params![is_ready, room_id.to_string(), user_id.to_string()],
        )?;
        Ok(())
    }
}

fn map_membership_conflict(user_id: Uuid, e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::AlreadyInRoom(user_id)
        }
        _ => Error::Database(e),
    }
}

fn player_from_row(row: &Row<'_>) -> std::result::Result<RoomPlayer, rusqlite::Error> {
    Ok(RoomPlayer {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        room_id: parse_uuid(&row.get::<_, String>(1)?)?,
        user_id: parse_uuid(&row.get::<_, String>(2)?)?,
        username: row.get(3)?,
        avatar_url: row.get(4)?,
        role: parse_role(&row.get::<_, String>(5)?)?,
        is_ready: row.get(6)?,
        joined_at: parse_datetime(&row.get::<_, String>(7)?)?,
        left_at: parse_datetime_opt(row.get::<_, Option<String>>(8)?)?,
    })
}
