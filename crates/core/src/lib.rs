//! Greenroom Core Library
//!
//! Room lifecycle, membership, queries, events and storage for the
//! Greenroom lobby coordinator.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod invariants;
pub mod models;
pub mod service;
pub mod storage;

pub use cache::RoomCache;
pub use config::{LobbyConfig, RetryConfig};
pub use error::{Error, ErrorKind, Result};
pub use events::{AuditLog, EventFanout, RoomEvent, RoomSubscription, StreamItem};
pub use gateway::{
    ContentCatalog, GameSessionGateway, GatewayError, GatewayResult, IdentityGateway, NewSession,
    PackInfo, PackValidation, RosterEntry, SessionHandle, UserIdentity,
};
pub use models::*;
pub use service::{
    Gateways, LifecycleService, Lobby, MembershipService, QueryService, ReadyStatus,
};
pub use storage::{Database, DbHandle};
