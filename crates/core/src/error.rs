//! Error types for Greenroom Core

use thiserror::Error;
use uuid::Uuid;

use crate::models::RoomStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Room not found: {0}")]
    RoomNotFound(Uuid),

    #[error("No room with code {0}")]
    RoomNotFoundByCode(String),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Pack not found: {0}")]
    PackNotFound(Uuid),

    #[error("Pack {0} is not approved for play")]
    PackNotApproved(Uuid),

    #[error("Pack {0} is not owned by the requesting user")]
    PackNotOwned(Uuid),

    #[error("Player {user_id} is not in room {room_id}")]
    PlayerNotInRoom { room_id: Uuid, user_id: Uuid },

    #[error("Only the host may {action}")]
    NotHost { action: &'static str },

    #[error("Room is {current}, must be {required} to {action}")]
    InvalidState {
        current: RoomStatus,
        required: RoomStatus,
        action: &'static str,
    },

    #[error("At least {required} players are needed to start, room has {current}")]
    InsufficientPlayers { current: i64, required: i64 },

    #[error("User {0} already has an active room")]
    AlreadyInRoom(Uuid),

    #[error("Room {0} is full")]
    RoomFull(Uuid),

    #[error("Room code space exhausted after {attempts} attempts; widen the code alphabet or length")]
    CodeSpaceExhausted { attempts: u32 },

    #[error("Wrong room password")]
    WrongPassword,

    #[error("The host cannot be removed from their own room")]
    CannotKickHost,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Upstream {gateway} failed: {detail}")]
    Upstream { gateway: &'static str, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by facades to map errors onto transport codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidState,
    Conflict,
    ValidationFailed,
    UpstreamUnavailable,
    Internal,
}

impl Error {
    /// Wrap a gateway failure with the name of the service that produced it
    pub fn upstream(gateway: &'static str, error: impl std::fmt::Display) -> Self {
        Error::Upstream {
            gateway,
            detail: error.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RoomNotFound(_)
            | Error::RoomNotFoundByCode(_)
            | Error::UserNotFound(_)
            | Error::PackNotFound(_)
            | Error::PlayerNotInRoom { .. } => ErrorKind::NotFound,
            Error::NotHost { .. } => ErrorKind::Unauthorized,
            Error::InvalidState { .. } | Error::InsufficientPlayers { .. } => {
                ErrorKind::InvalidState
            }
            Error::AlreadyInRoom(_) | Error::RoomFull(_) | Error::CodeSpaceExhausted { .. } => {
                ErrorKind::Conflict
            }
            Error::PackNotApproved(_)
            | Error::PackNotOwned(_)
            | Error::WrongPassword
            | Error::CannotKickHost
            | Error::Validation(_) => ErrorKind::ValidationFailed,
            Error::Upstream { .. } => ErrorKind::UpstreamUnavailable,
            Error::Database(_) | Error::Io(_) | Error::Serialization(_) | Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
