//! Room model - one lobby instance

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Room lifecycle status
///
/// Legal transitions: Waiting -> Starting -> Playing, Waiting -> Cancelled,
/// and Starting -> Waiting (rollback after a failed start). Playing and
/// Cancelled are terminal for the lobby; gameplay state lives in the game
/// session service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Starting,
    Playing,
    Cancelled,
}

impl RoomStatus {
    /// The single transition table; every status write is checked here
    pub fn can_transition_to(self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Waiting, RoomStatus::Starting)
                | (RoomStatus::Starting, RoomStatus::Playing)
                | (RoomStatus::Starting, RoomStatus::Waiting)
                | (RoomStatus::Waiting, RoomStatus::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RoomStatus::Playing | RoomStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Starting => "starting",
            RoomStatus::Playing => "playing",
            RoomStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<RoomStatus> {
        match s {
            "waiting" => Some(RoomStatus::Waiting),
            "starting" => Some(RoomStatus::Starting),
            "playing" => Some(RoomStatus::Playing),
            "cancelled" => Some(RoomStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A Room coordinates players from creation until the game starts or the
/// room is cancelled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    /// Short join code, immutable once assigned
    pub code: String,
    pub name: String,
    pub host_id: Uuid,
    pub pack_id: Uuid,
    pub status: RoomStatus,
    pub max_players: i64,
    pub is_public: bool,
    pub password_hash: Option<String>,
    /// Active membership count, maintained in the same transaction as the
    /// membership rows themselves
    pub current_players: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn new(code: String, name: String, host_id: Uuid, pack_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code,
            name,
            host_id,
            pack_id,
            status: RoomStatus::Waiting,
            max_players: 6,
            is_public: true,
            password_hash: None,
            current_players: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_capacity(mut self, max_players: i64) -> Self {
        self.max_players = max_players;
        self
    }

    pub fn with_visibility(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    pub fn with_password_hash(mut self, hash: Option<String>) -> Self {
        self.password_hash = hash;
        self
    }

    pub fn is_full(&self) -> bool {
        self.current_players >= self.max_players
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Check a join password against the stored hash
    pub fn verify_password(&self, password: &str) -> bool {
        let Some(stored) = &self.password_hash else {
            return true;
        };
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Hash a room password for storage
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Internal(format!("password hashing failed: {e}")))
}
