//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use rusqlite::Connection;
use tracing::{info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema",
        sql: r#"
            -- Rooms table; rooms are never deleted, a terminal status is
            -- the deletion signal
            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                name TEXT NOT NULL,
                host_id TEXT NOT NULL,
                pack_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'waiting',
                max_players INTEGER NOT NULL DEFAULT 6,
                is_public INTEGER NOT NULL DEFAULT 1,
                password_hash TEXT,
                current_players INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            );

            -- Membership rows; one row per (room, user), reused on re-join,
            -- active while left_at is null
            CREATE TABLE IF NOT EXISTS room_players (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                username TEXT NOT NULL,
                avatar_url TEXT,
                role TEXT NOT NULL DEFAULT 'player',
                joined_at TEXT NOT NULL,
                left_at TEXT,
                UNIQUE (room_id, user_id),
                FOREIGN KEY (room_id) REFERENCES rooms(id)
            );

            -- Gameplay settings, 1:1 with rooms
            CREATE TABLE IF NOT EXISTS room_settings (
                room_id TEXT PRIMARY KEY,
                time_for_answer INTEGER NOT NULL DEFAULT 30,
                time_for_choice INTEGER NOT NULL DEFAULT 60,
                allow_wrong_answer INTEGER NOT NULL DEFAULT 1,
                show_right_answer INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id)
            );
        "#,
    },
    Migration {
        version: 2,
        description: "Membership constraints and listing indexes",
        sql: r#"
            -- Single active room per user, enforced at the storage level
            CREATE UNIQUE INDEX IF NOT EXISTS idx_room_players_one_active
                ON room_players(user_id) WHERE left_at IS NULL;

            -- Codes are unique among rooms still accepting a start
            CREATE UNIQUE INDEX IF NOT EXISTS idx_rooms_code_open
                ON rooms(code) WHERE status IN ('waiting', 'starting');

            CREATE INDEX IF NOT EXISTS idx_rooms_code ON rooms(code);

            CREATE INDEX IF NOT EXISTS idx_rooms_status_created
                ON rooms(status, created_at);

            CREATE INDEX IF NOT EXISTS idx_room_players_room_active
                ON room_players(room_id) WHERE left_at IS NULL;
        "#,
    },
    Migration {
        version: 3,
        description: "Ready flags for the all-ready auto-start",
        sql: r#"
            ALTER TABLE room_players ADD COLUMN is_ready INTEGER NOT NULL DEFAULT 0;
        "#,
    },
];

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;
    info!(current_version, "Checking for pending migrations");

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );

            conn.execute_batch(migration.sql)?;
            record_migration(conn, migration)?;

            info!(version = migration.version, "Migration complete");
        }
    }

    let new_version = get_current_version(conn)?;
    if new_version > current_version {
        info!(
            from = current_version,
            to = new_version,
            "Database schema updated"
        );
    }

    Ok(())
}

fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap_or(None);
    Ok(version.unwrap_or(0))
}

fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}
