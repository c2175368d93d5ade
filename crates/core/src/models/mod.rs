//! Core domain models for Greenroom

pub mod player;
pub mod request;
pub mod room;
pub mod settings;
pub mod view;

pub use player::{CloseReason, LeaveReason, PlayerRole, RoomPlayer};
pub use request::{
    CreateRoomRequest, JoinRoomRequest, PageRequest, RoomFilter, UpdateRoomRequest,
};
pub use room::{hash_password, Room, RoomStatus};
pub use settings::{GameplayPatch, RoomSettings};
pub use view::{PlayerView, RoomPage, RoomSummary, RoomView, SettingsView};
