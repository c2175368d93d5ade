//! Room storage operations

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_datetime_opt, parse_status, parse_uuid, OptionalExt};
use crate::error::{Error, Result};
use crate::models::{Room, RoomStatus};

const ROOM_COLUMNS: &str = "id, code, name, host_id, pack_id, status, max_players, is_public, \
     password_hash, current_players, created_at, updated_at, started_at, finished_at";

pub struct RoomStore<'a> {
    conn: &'a Connection,
}

impl<'a> RoomStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Persist a new room
    #[instrument(skip(self, room), fields(room_id = %room.id, code = %room.code))]
    pub fn create(&self, room: &Room) -> Result<()> {
        self.conn.execute(
            "INSERT INTO rooms (id, code, name, host_id, pack_id, status, max_players, is_public, \
             password_hash, current_players, created_at, updated_at, started_at, finished_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                room.id.to_string(),
                room.code,
                room.name,
                room.host_id.to_string(),
                room.pack_id.to_string(),
                room.status.as_str(),
                room.max_players,
                room.is_public,
                room.password_hash,
                room.current_players,
                room.created_at.to_rfc3339(),
                room.updated_at.to_rfc3339(),
                room.started_at.map(|t| t.to_rfc3339()),
                room.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Find room by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Room>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1"))?;

        let room = stmt
            .query_row(params![id.to_string()], room_from_row)
            .optional()?;

        Ok(room)
    }

    /// Find the newest room bearing a code. Codes of terminal rooms may be
    /// recycled, so the newest row is the meaningful one.
    #[instrument(skip(self))]
    pub fn find_by_code(&self, code: &str) -> Result<Option<Room>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE code = ?1 ORDER BY created_at DESC LIMIT 1"
        ))?;

        let room = stmt.query_row(params![code], room_from_row).optional()?;

        Ok(room)
    }

    /// Is this code held by a room that has not reached a terminal status?
    pub fn code_in_open_use(&self, code: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM rooms WHERE code = ?1 AND status IN ('waiting', 'starting')",
            params![code],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Guarded status change; the WHERE clause on the current status is the
    /// linearization point for concurrent transitions.
    #[instrument(skip(self))]
    pub fn transition_status(
        &self,
        id: Uuid,
        from: RoomStatus,
        to: RoomStatus,
        action: &'static str,
    ) -> Result<Room> {
        if !from.can_transition_to(to) {
            return Err(Error::Internal(format!(
                "illegal status transition {from} -> {to}"
            )));
        }

        let now = Utc::now().to_rfc3339();
        let sql = match to {
            RoomStatus::Starting => {
                "UPDATE rooms SET status = ?1, updated_at = ?2, started_at = ?2 \
                 WHERE id = ?3 AND status = ?4"
            }
            RoomStatus::Waiting => {
                "UPDATE rooms SET status = ?1, updated_at = ?2, started_at = NULL \
                 WHERE id = ?3 AND status = ?4"
            }
            RoomStatus::Playing => {
                "UPDATE rooms SET status = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND status = ?4"
            }
            RoomStatus::Cancelled => {
                "UPDATE rooms SET status = ?1, updated_at = ?2, finished_at = ?2 \
                 WHERE id = ?3 AND status = ?4"
            }
        };

        let rows = self.conn.execute(
            sql,
            params![to.as_str(), now, id.to_string(), from.as_str()],
        )?;

        if rows == 0 {
            return match self.find_by_id(id)? {
                None => Err(Error::RoomNotFound(id)),
                Some(room) => Err(Error::InvalidState {
                    current: room.status,
                    required: from,
                    action,
                }),
            };
        }

        self.find_by_id(id)?.ok_or(Error::RoomNotFound(id))
    }

    /// Update host reference after a transfer or reassignment
    pub fn set_host(&self, id: Uuid, host_id: Uuid) -> Result<()> {
        self.conn.execute(
            "UPDATE rooms SET host_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![host_id.to_string(), Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    /// Persist the recomputed active player count
    pub fn set_player_count(&self, id: Uuid, count: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE rooms SET current_players = ?1, updated_at = ?2 WHERE id = ?3",
            params![count, Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    /// Update the host-configurable room fields
    #[instrument(skip(self, room), fields(room_id = %room.id))]
    pub fn update_config(&self, room: &Room) -> Result<()> {
        self.conn.execute(
            "UPDATE rooms SET max_players = ?1, is_public = ?2, password_hash = ?3, \
             updated_at = ?4 WHERE id = ?5",
            params![
                room.max_players,
                room.is_public,
                room.password_hash,
                Utc::now().to_rfc3339(),
                room.id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Public waiting rooms with a free slot, newest first
    #[instrument(skip(self))]
    pub fn list_public_waiting(&self, limit: i64, offset: i64) -> Result<Vec<Room>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms \
             WHERE status = 'waiting' AND is_public = 1 AND current_players < max_players \
             ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
        ))?;

        let rooms = stmt
            .query_map(params![limit, offset], room_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rooms)
    }

    pub fn count_public_waiting(&self) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM rooms \
             WHERE status = 'waiting' AND is_public = 1 AND current_players < max_players",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Rooms in a given status, newest first
    #[instrument(skip(self))]
    pub fn list_by_status(&self, status: RoomStatus, limit: i64, offset: i64) -> Result<Vec<Room>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE status = ?1 \
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
        ))?;

        let rooms = stmt
            .query_map(params![status.as_str(), limit, offset], room_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rooms)
    }

    pub fn count_by_status(&self, status: RoomStatus) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM rooms WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn room_from_row(row: &Row<'_>) -> std::result::Result<Room, rusqlite::Error> {
    Ok(Room {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        code: row.get(1)?,
        name: row.get(2)?,
        host_id: parse_uuid(&row.get::<_, String>(3)?)?,
        pack_id: parse_uuid(&row.get::<_, String>(4)?)?,
        status: parse_status(&row.get::<_, String>(5)?)?,
        max_players: row.get(6)?,
        is_public: row.get(7)?,
        password_hash: row.get(8)?,
        current_players: row.get(9)?,
        created_at: parse_datetime(&row.get::<_, String>(10)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(11)?)?,
        started_at: parse_datetime_opt(row.get::<_, Option<String>>(12)?)?,
        finished_at: parse_datetime_opt(row.get::<_, Option<String>>(13)?)?,
    })
}
