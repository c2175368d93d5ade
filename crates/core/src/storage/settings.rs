//! Gameplay settings storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::RoomSettings;

pub struct SettingsStore<'a> {
    conn: &'a Connection,
}

impl<'a> SettingsStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    #[instrument(skip(self, settings), fields(room_id = %settings.room_id))]
    pub fn create(&self, settings: &RoomSettings) -> Result<()> {
        self.conn.execute(
            "INSERT INTO room_settings (room_id, time_for_answer, time_for_choice, \
             allow_wrong_answer, show_right_answer, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                settings.room_id.to_string(),
                settings.time_for_answer,
                settings.time_for_choice,
                settings.allow_wrong_answer,
                settings.show_right_answer,
                settings.created_at.to_rfc3339(),
                settings.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_room(&self, room_id: Uuid) -> Result<Option<RoomSettings>> {
        let mut stmt = self.conn.prepare(
            "SELECT room_id, time_for_answer, time_for_choice, allow_wrong_answer, \
             show_right_answer, created_at, updated_at \
             FROM room_settings WHERE room_id = ?1",
        )?;

        let settings = stmt
            .query_row(params![room_id.to_string()], settings_from_row)
            .optional()?;

        Ok(settings)
    }

    #[instrument(skip(self, settings), fields(room_id = %settings.room_id))]
    pub fn update(&self, settings: &RoomSettings) -> Result<()> {
        self.conn.execute(
            "UPDATE room_settings SET time_for_answer = ?1, time_for_choice = ?2, \
             allow_wrong_answer = ?3, show_right_answer = ?4, updated_at = ?5 \
             WHERE room_id = ?6",
            params![
                settings.time_for_answer,
                settings.time_for_choice,
                settings.allow_wrong_answer,
                settings.show_right_answer,
                settings.updated_at.to_rfc3339(),
                settings.room_id.to_string(),
            ],
        )?;
        Ok(())
    }
}

fn settings_from_row(row: &Row<'_>) -> std::result::Result<RoomSettings, rusqlite::Error> {
    Ok(RoomSettings {
        room_id: parse_uuid(&row.get::<_, String>(0)?)?,
        time_for_answer: row.get(1)?,
        time_for_choice: row.get(2)?,
        allow_wrong_answer: row.get(3)?,
        show_right_answer: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(6)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GameplayPatch, Room};
    use crate::storage::Database;

    #[test]
    fn test_create_find_update() {
        let db = Database::open_in_memory().unwrap();
        let room = Room::new("AB12CD".into(), "Test".into(), Uuid::new_v4(), Uuid::new_v4());
        db.rooms().create(&room).unwrap();

        let mut settings = RoomSettings::new(room.id);
        db.settings().create(&settings).unwrap();

        let found = db.settings().find_by_room(room.id).unwrap().unwrap();
        assert_eq!(found.time_for_answer, 30);
        assert_eq!(found.time_for_choice, 60);
        assert!(found.allow_wrong_answer);

        settings.apply(&GameplayPatch {
            time_for_answer: Some(45),
            show_right_answer: Some(false),
            ..Default::default()
        });
        db.settings().update(&settings).unwrap();

        let found = db.settings().find_by_room(room.id).unwrap().unwrap();
        assert_eq!(found.time_for_answer, 45);
        assert_eq!(found.time_for_choice, 60);
        assert!(!found.show_right_answer);
    }

    #[test]
    fn test_missing_row_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.settings().find_by_room(Uuid::new_v4()).unwrap().is_none());
    }
}
