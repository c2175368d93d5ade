//! Room event model and fan-out
//!
//! Services publish one event; the fanout copies it to two isolated sinks.
//! Live subscribers get it over per-room broadcast channels, the audit log
//! gets it on disk. A failure in one sink never reaches the other.

mod audit;
mod broadcast;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::models::{CloseReason, LeaveReason, RoomPlayer, RoomSettings, SettingsView};

pub use audit::{AuditLog, AuditLogHandle};
pub use broadcast::{RoomSubscription, StreamItem};

use broadcast::RoomChannels;

/// Something that happened to a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    /// Dedup key for at-least-once consumers
    pub event_id: Uuid,
    pub room_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventPayload {
    RoomCreated {
        host_id: Uuid,
        host_username: String,
        room_code: String,
        pack_id: Uuid,
        pack_name: Option<String>,
    },
    PlayerJoined {
        user_id: Uuid,
        username: String,
        current_players: i64,
    },
    PlayerLeft {
        user_id: Uuid,
        username: String,
        reason: LeaveReason,
        current_players: i64,
    },
    PlayerReady {
        user_id: Uuid,
        username: String,
        is_ready: bool,
        ready_count: i64,
        total_count: i64,
        all_ready: bool,
    },
    SettingsUpdated {
        settings: SettingsView,
    },
    GameStarted {
        session_id: String,
        connect_url: String,
    },
    RoomClosed {
        reason: CloseReason,
    },
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoomCreated { .. } => "room_created",
            Self::PlayerJoined { .. } => "player_joined",
            Self::PlayerLeft { .. } => "player_left",
            Self::PlayerReady { .. } => "player_ready",
            Self::SettingsUpdated { .. } => "settings_updated",
            Self::GameStarted { .. } => "game_started",
            Self::RoomClosed { .. } => "room_closed",
        }
    }
}

impl RoomEvent {
    fn new(room_id: Uuid, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            room_id,
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn room_created(
        room_id: Uuid,
        host_id: Uuid,
        host_username: &str,
        room_code: &str,
        pack_id: Uuid,
        pack_name: Option<String>,
    ) -> Self {
        Self::new(
            room_id,
            EventPayload::RoomCreated {
                host_id,
                host_username: host_username.to_string(),
                room_code: room_code.to_string(),
                pack_id,
                pack_name,
            },
        )
    }

    pub fn player_joined(room_id: Uuid, player: &RoomPlayer, current_players: i64) -> Self {
        Self::new(
            room_id,
            EventPayload::PlayerJoined {
                user_id: player.user_id,
                username: player.username.clone(),
                current_players,
            },
        )
    }

    pub fn player_left(
        room_id: Uuid,
        user_id: Uuid,
        username: &str,
        reason: LeaveReason,
        current_players: i64,
    ) -> Self {
        Self::new(
            room_id,
            EventPayload::PlayerLeft {
                user_id,
                username: username.to_string(),
                reason,
                current_players,
            },
        )
    }

    pub fn player_ready(
        room_id: Uuid,
        player: &RoomPlayer,
        ready_count: i64,
        total_count: i64,
        all_ready: bool,
    ) -> Self {
        Self::new(
            room_id,
            EventPayload::PlayerReady {
                user_id: player.user_id,
                username: player.username.clone(),
                is_ready: player.is_ready,
                ready_count,
                total_count,
                all_ready,
            },
        )
    }

    pub fn settings_updated(room_id: Uuid, settings: &RoomSettings) -> Self {
        Self::new(
            room_id,
            EventPayload::SettingsUpdated {
                settings: SettingsView::from(settings),
            },
        )
    }

    pub fn game_started(room_id: Uuid, session_id: &str, connect_url: &str) -> Self {
        Self::new(
            room_id,
            EventPayload::GameStarted {
                session_id: session_id.to_string(),
                connect_url: connect_url.to_string(),
            },
        )
    }

    pub fn room_closed(room_id: Uuid, reason: CloseReason) -> Self {
        Self::new(room_id, EventPayload::RoomClosed { reason })
    }
}

/// Copies each published event to the live channels and the audit log
#[derive(Clone)]
pub struct EventFanout {
    channels: Arc<RoomChannels>,
    audit: AuditLogHandle,
    keepalive: Duration,
}

impl EventFanout {
    pub fn new(stream_buffer: usize, keepalive: Duration, audit: AuditLogHandle) -> Self {
        Self {
            channels: Arc::new(RoomChannels::new(stream_buffer)),
            audit,
            keepalive,
        }
    }

    /// Publish to both sinks
    pub fn publish(&self, event: RoomEvent) {
        self.audit.record(&event);
        let delivered = self.channels.send(&event);
        debug!(
            room_id = %event.room_id,
            kind = event.payload.kind(),
            delivered,
            "published room event"
        );
    }

    /// Record an event without waking live subscribers
    pub fn audit_only(&self, event: RoomEvent) {
        debug!(
            room_id = %event.room_id,
            kind = event.payload.kind(),
            "recording audit-only event"
        );
        self.audit.record(&event);
    }

    /// Attach a live subscriber to a room's stream
    pub fn subscribe(&self, room_id: Uuid) -> RoomSubscription {
        self.channels.subscribe(room_id, self.keepalive)
    }

    /// Tear down a closed room's channel once its final event is queued
    pub fn close_room(&self, room_id: Uuid) {
        self.channels.close(room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlayerRole;

    async fn fanout(dir: &tempfile::TempDir) -> (EventFanout, AuditLog) {
        let log = AuditLog::open(dir.path().join("events.jsonl")).await.unwrap();
        let fanout = EventFanout::new(16, Duration::from_secs(3600), log.handle());
        (fanout, log)
    }

    #[test]
    fn test_event_wire_shape() {
        let room_id = Uuid::new_v4();
        let player = RoomPlayer::new(room_id, Uuid::new_v4(), "ada".into(), PlayerRole::Player);
        let event = RoomEvent::player_joined(room_id, &player, 3);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "player_joined");
        assert_eq!(json["username"], "ada");
        assert_eq!(json["current_players"], 3);
        assert_eq!(json["room_id"], room_id.to_string());

        let back: RoomEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_payload_kinds() {
        let room_id = Uuid::new_v4();
        assert_eq!(
            RoomEvent::room_closed(room_id, CloseReason::Empty).payload.kind(),
            "room_closed"
        );
        assert_eq!(
            RoomEvent::game_started(room_id, "s-1", "wss://play").payload.kind(),
            "game_started"
        );
    }

    #[tokio::test]
    async fn test_publish_reaches_both_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let (fanout, log) = fanout(&dir).await;
        let room_id = Uuid::new_v4();

        let mut sub = fanout.subscribe(room_id);
        let event = RoomEvent::room_closed(room_id, CloseReason::Empty);
        fanout.publish(event.clone());

        assert_eq!(sub.next().await, StreamItem::Event(event.clone()));

        drop(fanout);
        log.shutdown().await;
        let contents = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        let written: RoomEvent = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(written.event_id, event.event_id);
    }

    #[tokio::test]
    async fn test_audit_only_skips_live_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let (fanout, log) = fanout(&dir).await;
        let room_id = Uuid::new_v4();

        let mut sub = fanout.subscribe(room_id);
        fanout.audit_only(RoomEvent::room_created(
            room_id,
            Uuid::new_v4(),
            "ada",
            "AB12CD",
            Uuid::new_v4(),
            None,
        ));
        let visible = RoomEvent::room_closed(room_id, CloseReason::Empty);
        fanout.publish(visible.clone());

        // The first thing the subscriber sees is the published event
        assert_eq!(sub.next().await, StreamItem::Event(visible));

        drop(fanout);
        log.shutdown().await;
        let contents = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_closed_room_stream_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let (fanout, _log) = fanout(&dir).await;
        let room_id = Uuid::new_v4();

        let mut sub = fanout.subscribe(room_id);
        let last = RoomEvent::room_closed(room_id, CloseReason::HostClosed);
        fanout.publish(last.clone());
        fanout.close_room(room_id);

        assert_eq!(sub.next().await, StreamItem::Event(last));
        assert_eq!(sub.next().await, StreamItem::Closed);
    }
}
