//! Materialized read views returned by the coordinator
//!
//! Views are assembled from the authoritative store rows and enriched
//! best-effort with gateway metadata (pack name, host display name).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PlayerRole, Room, RoomPlayer, RoomSettings, RoomStatus};

/// Flat room summary used in listings and as the cache projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub host_id: Uuid,
    pub host_username: Option<String>,
    pub pack_id: Uuid,
    pub pack_name: Option<String>,
    pub status: RoomStatus,
    pub current_players: i64,
    pub max_players: i64,
    pub is_public: bool,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
}

impl RoomSummary {
    pub fn from_room(room: &Room) -> Self {
        Self {
            id: room.id,
            code: room.code.clone(),
            name: room.name.clone(),
            host_id: room.host_id,
            host_username: None,
            pack_id: room.pack_id,
            pack_name: None,
            status: room.status,
            current_players: room.current_players,
            max_players: room.max_players,
            is_public: room.is_public,
            has_password: room.has_password(),
            created_at: room.created_at,
        }
    }

    pub fn has_free_slot(&self) -> bool {
        self.current_players < self.max_players
    }
}

/// One active player as shown to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub user_id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub role: PlayerRole,
    pub is_ready: bool,
    pub joined_at: DateTime<Utc>,
}

impl From<&RoomPlayer> for PlayerView {
    fn from(player: &RoomPlayer) -> Self {
        Self {
            user_id: player.user_id,
            username: player.username.clone(),
            avatar_url: player.avatar_url.clone(),
            role: player.role,
            is_ready: player.is_ready,
            joined_at: player.joined_at,
        }
    }
}

/// Gameplay settings as shown to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsView {
    pub time_for_answer: i64,
    pub time_for_choice: i64,
    pub allow_wrong_answer: bool,
    pub show_right_answer: bool,
}

impl From<&RoomSettings> for SettingsView {
    fn from(settings: &RoomSettings) -> Self {
        Self {
            time_for_answer: settings.time_for_answer,
            time_for_choice: settings.time_for_choice,
            allow_wrong_answer: settings.allow_wrong_answer,
            show_right_answer: settings.show_right_answer,
        }
    }
}

/// Full room detail: summary plus roster and settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    #[serde(flatten)]
    pub summary: RoomSummary,
    pub players: Vec<PlayerView>,
    pub settings: Option<SettingsView>,
}

impl RoomView {
    pub fn from_parts(
        room: &Room,
        players: &[RoomPlayer],
        settings: Option<&RoomSettings>,
    ) -> Self {
        Self {
            summary: RoomSummary::from_room(room),
            players: players.iter().map(PlayerView::from).collect(),
            settings: settings.map(SettingsView::from),
        }
    }

    pub fn id(&self) -> Uuid {
        self.summary.id
    }

    pub fn status(&self) -> RoomStatus {
        self.summary.status
    }
}

/// One page of room summaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomPage {
    pub rooms: Vec<RoomSummary>,
    pub total: i64,
    pub page: u32,
    pub size: u32,
}
