//! Membership models - one user's seat in one room

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a player inside a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Host,
    Player,
    Spectator,
}

impl PlayerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayerRole::Host => "host",
            PlayerRole::Player => "player",
            PlayerRole::Spectator => "spectator",
        }
    }

    pub fn parse(s: &str) -> Option<PlayerRole> {
        match s {
            "host" => Some(PlayerRole::Host),
            "player" => Some(PlayerRole::Player),
            "spectator" => Some(PlayerRole::Spectator),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlayerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One user's membership record in one room, including departed memberships.
/// A player is active while `left_at` is `None`; re-joining reuses the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomPlayer {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    /// Display-name snapshot taken at join time
    pub username: String,
    pub avatar_url: Option<String>,
    pub role: PlayerRole,
    pub is_ready: bool,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl RoomPlayer {
    pub fn new(room_id: Uuid, user_id: Uuid, username: String, role: PlayerRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            user_id,
            username,
            avatar_url: None,
            role,
            is_ready: false,
            joined_at: Utc::now(),
            left_at: None,
        }
    }

    pub fn with_avatar(mut self, avatar_url: Option<String>) -> Self {
        self.avatar_url = avatar_url;
        self
    }

    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }

    pub fn is_host(&self) -> bool {
        self.role == PlayerRole::Host
    }
}

/// Why a player left a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveReason {
    Left,
    Kicked,
}

/// Why a room was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Every player left
    Empty,
    /// The host deleted the room
    HostClosed,
}
