//! Request types for the mutating operations, with input validation

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::LobbyConfig;
use crate::error::{Error, Result};
use crate::models::settings::GameplayPatch;
use crate::models::{PlayerRole, RoomStatus};

pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 100;
pub const PASSWORD_MIN_LEN: usize = 4;
pub const PASSWORD_MAX_LEN: usize = 50;
pub const MIN_ROOM_CAPACITY: i64 = 2;

/// Request to create a room; the caller becomes host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub pack_id: Uuid,
    pub max_players: Option<i64>,
    pub is_public: Option<bool>,
    pub password: Option<String>,
    pub settings: Option<GameplayPatch>,
}

impl CreateRoomRequest {
    pub fn new(name: impl Into<String>, pack_id: Uuid) -> Self {
        Self {
            name: name.into(),
            pack_id,
            max_players: None,
            is_public: None,
            password: None,
            settings: None,
        }
    }

    pub fn validate(&self, config: &LobbyConfig) -> Result<()> {
        let name_len = self.name.trim().chars().count();
        if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name_len) {
            return Err(Error::Validation(format!(
                "room name must be {NAME_MIN_LEN}-{NAME_MAX_LEN} characters, got {name_len}"
            )));
        }
        if let Some(max) = self.max_players {
            if !(MIN_ROOM_CAPACITY..=config.max_players_limit).contains(&max) {
                return Err(Error::Validation(format!(
                    "max_players must be between {MIN_ROOM_CAPACITY} and {}, got {max}",
                    config.max_players_limit
                )));
            }
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        if let Some(settings) = &self.settings {
            settings.validate()?;
        }
        Ok(())
    }
}

/// Request to join a room
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    pub password: Option<String>,
    /// Player by default; spectators may ask to watch. Host is never
    /// requestable, it is granted by creation or transfer.
    pub role: Option<PlayerRole>,
}

impl JoinRoomRequest {
    pub fn validate(&self) -> Result<()> {
        if self.role == Some(PlayerRole::Host) {
            return Err(Error::Validation(
                "cannot join as host; the host role is assigned by the room".into(),
            ));
        }
        Ok(())
    }

    pub fn requested_role(&self) -> PlayerRole {
        self.role.unwrap_or(PlayerRole::Player)
    }
}

/// Host-only partial update of room configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRoomRequest {
    pub max_players: Option<i64>,
    pub is_public: Option<bool>,
    /// Set a new password (hashed before storage)
    pub password: Option<String>,
    /// Drop the password entirely; ignored when `password` is also set
    pub clear_password: bool,
    pub gameplay: Option<GameplayPatch>,
}

impl UpdateRoomRequest {
    pub fn is_empty(&self) -> bool {
        self.max_players.is_none()
            && self.is_public.is_none()
            && self.password.is_none()
            && !self.clear_password
            && self.gameplay.as_ref().map_or(true, |g| g.is_empty())
    }

    pub fn validate(&self, config: &LobbyConfig) -> Result<()> {
        if self.is_empty() {
            return Err(Error::Validation("no fields to update".into()));
        }
        if let Some(max) = self.max_players {
            if !(MIN_ROOM_CAPACITY..=config.max_players_limit).contains(&max) {
                return Err(Error::Validation(format!(
                    "max_players must be between {MIN_ROOM_CAPACITY} and {}, got {max}",
                    config.max_players_limit
                )));
            }
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        if let Some(gameplay) = &self.gameplay {
            gameplay.validate()?;
        }
        Ok(())
    }
}

fn validate_password(password: &str) -> Result<()> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(Error::Validation(format!(
            "password must be {PASSWORD_MIN_LEN}-{PASSWORD_MAX_LEN} characters"
        )));
    }
    Ok(())
}

/// Filter for room listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomFilter {
    /// Defaults to waiting rooms when unset
    pub status: Option<RoomStatus>,
    /// Restrict to public rooms with a free slot
    pub joinable_only: bool,
}

impl Default for RoomFilter {
    /// The browse-screen default: public waiting rooms with space
    fn default() -> Self {
        Self {
            status: None,
            joinable_only: true,
        }
    }
}

impl RoomFilter {
    /// Public waiting rooms, spelled out
    pub fn joinable() -> Self {
        Self {
            status: Some(RoomStatus::Waiting),
            joinable_only: true,
        }
    }

    /// Every room in one status, including private and full ones
    pub fn by_status(status: RoomStatus) -> Self {
        Self {
            status: Some(status),
            joinable_only: false,
        }
    }

    /// True when the cache's waiting-room projection can answer this filter
    pub fn is_cacheable(&self) -> bool {
        self.joinable_only && matches!(self.status, None | Some(RoomStatus::Waiting))
    }
}

/// Zero-based pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

pub const MAX_PAGE_SIZE: u32 = 100;

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Result<Self> {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(Error::Validation(format!(
                "page size must be 1-{MAX_PAGE_SIZE}, got {size}"
            )));
        }
        Ok(Self { page, size })
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_validation() {
        let config = LobbyConfig::default();
        let pack_id = Uuid::new_v4();

        CreateRoomRequest::new("Friday Quiz", pack_id)
            .validate(&config)
            .unwrap();

        let short = CreateRoomRequest::new("ab", pack_id);
        assert!(short.validate(&config).is_err());

        let mut oversized = CreateRoomRequest::new("Friday Quiz", pack_id);
        oversized.max_players = Some(13);
        assert!(oversized.validate(&config).is_err());

        let mut weak = CreateRoomRequest::new("Friday Quiz", pack_id);
        weak.password = Some("abc".into());
        assert!(weak.validate(&config).is_err());
    }

    #[test]
    fn test_join_request_rejects_host_role() {
        let request = JoinRoomRequest {
            role: Some(PlayerRole::Host),
            ..JoinRoomRequest::default()
        };
        assert!(request.validate().is_err());
        assert_eq!(
            JoinRoomRequest::default().requested_role(),
            PlayerRole::Player
        );
    }

    #[test]
    fn test_update_request_rejects_empty() {
        let config = LobbyConfig::default();
        assert!(UpdateRoomRequest::default().validate(&config).is_err());

        let update = UpdateRoomRequest {
            is_public: Some(false),
            ..UpdateRoomRequest::default()
        };
        update.validate(&config).unwrap();
    }

    #[test]
    fn test_page_request_bounds() {
        assert!(PageRequest::new(0, 0).is_err());
        assert!(PageRequest::new(0, 101).is_err());
        let page = PageRequest::new(2, 25).unwrap();
        assert_eq!(page.offset(), 50);
        assert_eq!(page.limit(), 25);
    }

    #[test]
    fn test_filter_cacheability() {
        assert!(RoomFilter::joinable().is_cacheable());
        assert!(RoomFilter::default().is_cacheable());
        // Status listings include private and full rooms, which the cache
        // projection drops
        assert!(!RoomFilter::by_status(RoomStatus::Waiting).is_cacheable());
        assert!(!RoomFilter::by_status(RoomStatus::Playing).is_cacheable());
    }
}
