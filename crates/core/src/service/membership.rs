//! Membership: joining, leaving, kicks, host transfer and readiness
//!
//! Every membership write re-checks its preconditions inside the storage
//! transaction (status, password, capacity, the one-room rule), so the
//! checks and the seat change are atomic. Cache and event work happens
//! after commit; the cache is a hint, the store is the answer.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::RoomEvent;
use crate::gateway::{GatewayError, IdentityGateway, SessionHandle};
use crate::invariants;
use crate::models::{
    CloseReason, JoinRoomRequest, LeaveReason, PlayerRole, Room, RoomPlayer, RoomSettings,
    RoomStatus, RoomView,
};
use crate::storage::{PlayerStore, RoomStore, SettingsStore};

use super::lifecycle::LifecycleService;
use super::Shared;

/// Outcome of `set_ready`, including the auto-start result when the last
/// ready toggle launched the game
#[derive(Debug, Clone)]
pub struct ReadyStatus {
    pub ready_count: i64,
    pub total_count: i64,
    pub all_ready: bool,
    pub started: Option<SessionHandle>,
}

enum JoinOutcome {
    AlreadySeated {
        room: Room,
        roster: Vec<RoomPlayer>,
        settings: Option<RoomSettings>,
    },
    Joined {
        room: Room,
        roster: Vec<RoomPlayer>,
        settings: Option<RoomSettings>,
        player: RoomPlayer,
    },
}

enum LeaveOutcome {
    Departed {
        room: Room,
        username: String,
        promoted: Option<RoomPlayer>,
    },
    Closed {
        username: String,
    },
}

/// Seat players in rooms and keep the roster consistent
#[derive(Clone)]
pub struct MembershipService {
    shared: Shared,
    identity: Arc<dyn IdentityGateway>,
    lifecycle: LifecycleService,
}

impl MembershipService {
    pub(crate) fn new(
        shared: Shared,
        identity: Arc<dyn IdentityGateway>,
        lifecycle: LifecycleService,
    ) -> Self {
        Self {
            shared,
            identity,
            lifecycle,
        }
    }

    /// Join a room as a player or spectator.
    ///
    /// Joining a room the user is already seated in returns the current
    /// view unchanged. Seats are checked and taken in one transaction, so
    /// a full room never over-admits under concurrent joins.
    #[instrument(skip(self, request), fields(room_id = %room_id, user_id = %user_id))]
    pub async fn join_room(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        request: JoinRoomRequest,
    ) -> Result<RoomView> {
        invariants::assert_user_id_valid(user_id, "join_room");
        invariants::assert_room_id_valid(room_id, "join_room");
        request.validate()?;

        let profile = self.identity.resolve(user_id).await.map_err(|e| match e {
            GatewayError::NotFound(_) => Error::UserNotFound(user_id),
            other => Error::upstream("identity", other),
        })?;

        let role = request.requested_role();
        let password = request.password.clone().unwrap_or_default();
        let outcome = self
            .shared
            .db
            .write(move |tx| {
                let rooms = RoomStore::new(tx);
                let players = PlayerStore::new(tx);
                let settings_store = SettingsStore::new(tx);

                let room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;

                // Re-joining your own seat is a no-op, not an error
                if players.find_active(room_id, user_id)?.is_some() {
                    let roster = players.list_active(room_id)?;
                    let settings = settings_store.find_by_room(room_id)?;
                    return Ok(JoinOutcome::AlreadySeated {
                        room,
                        roster,
                        settings,
                    });
                }

                if room.status != RoomStatus::Waiting {
                    return Err(Error::InvalidState {
                        current: room.status,
                        required: RoomStatus::Waiting,
                        action: "join the room",
                    });
                }
                if !room.verify_password(&password) {
                    return Err(Error::WrongPassword);
                }
                if players.count_active(room_id)? >= room.max_players {
                    return Err(Error::RoomFull(room_id));
                }
                if players.find_active_by_user(user_id)?.is_some() {
                    return Err(Error::AlreadyInRoom(user_id));
                }

                let player = players.upsert_membership(
                    room_id,
                    user_id,
                    &profile.username,
                    profile.avatar_url.as_deref(),
                    role,
                )?;
                let count = players.count_active(room_id)?;
                rooms.set_player_count(room_id, count)?;

                let room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                let roster = players.list_active(room_id)?;
                let settings = settings_store.find_by_room(room_id)?;
                invariants::assert_roster_invariants(&room, &roster);
                Ok(JoinOutcome::Joined {
                    room,
                    roster,
                    settings,
                    player,
                })
            })
            .await?;

        let (room, roster, settings) = match outcome {
            JoinOutcome::AlreadySeated {
                room,
                roster,
                settings,
            } => (room, roster, settings),
            JoinOutcome::Joined {
                room,
                roster,
                settings,
                player,
            } => {
                self.shared.cache.seat(user_id, room_id);
                self.shared.refresh_summary(&room).await;
                self.shared.events.publish(RoomEvent::player_joined(
                    room_id,
                    &player,
                    room.current_players,
                ));
                (room, roster, settings)
            }
        };

        Ok(self
            .shared
            .views
            .room_view(&room, &roster, settings.as_ref())
            .await)
    }

    /// Leave a room.
    ///
    /// A departing host hands the room to the longest-seated remaining
    /// member; the last player out closes a waiting room entirely.
    #[instrument(skip(self), fields(room_id = %room_id, user_id = %user_id))]
    pub async fn leave_room(&self, room_id: Uuid, user_id: Uuid) -> Result<()> {
        let outcome = self
            .shared
            .db
            .write(move |tx| {
                let rooms = RoomStore::new(tx);
                let players = PlayerStore::new(tx);

                let room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                let player = players
                    .find_active(room_id, user_id)?
                    .ok_or(Error::PlayerNotInRoom { room_id, user_id })?;

                players.mark_left(room_id, user_id, Utc::now())?;
                let remaining = players.list_active(room_id)?;
                rooms.set_player_count(room_id, remaining.len() as i64)?;

                if remaining.is_empty() && room.status == RoomStatus::Waiting {
                    rooms.transition_status(
                        room_id,
                        RoomStatus::Waiting,
                        RoomStatus::Cancelled,
                        "close the room",
                    )?;
                    return Ok(LeaveOutcome::Closed {
                        username: player.username,
                    });
                }

                let mut promoted = None;
                if room.host_id == user_id {
                    if let Some(next) = remaining.first() {
                        players.set_role(room_id, next.user_id, PlayerRole::Host)?;
                        rooms.set_host(room_id, next.user_id)?;
                        promoted = players.find_active(room_id, next.user_id)?;
                    }
                }

                let room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                let roster = players.list_active(room_id)?;
                invariants::assert_roster_invariants(&room, &roster);
                Ok(LeaveOutcome::Departed {
                    room,
                    username: player.username,
                    promoted,
                })
            })
            .await?;

        self.shared.cache.unseat(user_id, room_id);
        match outcome {
            LeaveOutcome::Closed { username } => {
                self.shared.events.publish(RoomEvent::player_left(
                    room_id,
                    user_id,
                    &username,
                    LeaveReason::Left,
                    0,
                ));
                self.shared.retire_room(room_id, CloseReason::Empty);
            }
            LeaveOutcome::Departed {
                room,
                username,
                promoted,
            } => {
                self.shared.events.publish(RoomEvent::player_left(
                    room_id,
                    user_id,
                    &username,
                    LeaveReason::Left,
                    room.current_players,
                ));
                if let Some(new_host) = promoted {
                    info!(
                        room_id = %room_id,
                        new_host = %new_host.username,
                        "host left, promoted the longest-seated member"
                    );
                    self.shared.rebuild_summary(&room).await;
                } else {
                    self.shared.refresh_summary(&room).await;
                }
            }
        }
        Ok(())
    }

    /// Host-only removal of another member from a waiting room
    #[instrument(skip(self), fields(room_id = %room_id, host_id = %host_id, target_id = %target_id))]
    pub async fn kick_player(
        &self,
        room_id: Uuid,
        host_id: Uuid,
        target_id: Uuid,
    ) -> Result<()> {
        let (room, username) = self
            .shared
            .db
            .write(move |tx| {
                let rooms = RoomStore::new(tx);
                let players = PlayerStore::new(tx);

                let room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                if room.host_id != host_id {
                    return Err(Error::NotHost {
                        action: "kick a player",
                    });
                }
                if room.status != RoomStatus::Waiting {
                    return Err(Error::InvalidState {
                        current: room.status,
                        required: RoomStatus::Waiting,
                        action: "kick a player",
                    });
                }
                if target_id == room.host_id {
                    return Err(Error::CannotKickHost);
                }
                let target = players
                    .find_active(room_id, target_id)?
                    .ok_or(Error::PlayerNotInRoom {
                        room_id,
                        user_id: target_id,
                    })?;

                players.mark_left(room_id, target_id, Utc::now())?;
                let count = players.count_active(room_id)?;
                rooms.set_player_count(room_id, count)?;

                let room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                Ok((room, target.username))
            })
            .await?;

        self.shared.cache.unseat(target_id, room_id);
        self.shared.events.publish(RoomEvent::player_left(
            room_id,
            target_id,
            &username,
            LeaveReason::Kicked,
            room.current_players,
        ));
        self.shared.refresh_summary(&room).await;
        Ok(())
    }

    /// Hand the host role to another active member of a waiting room
    #[instrument(skip(self), fields(room_id = %room_id, host_id = %host_id, target_id = %target_id))]
    pub async fn transfer_host(
        &self,
        room_id: Uuid,
        host_id: Uuid,
        target_id: Uuid,
    ) -> Result<()> {
        let room = self
            .shared
            .db
            .write(move |tx| {
                let rooms = RoomStore::new(tx);
                let players = PlayerStore::new(tx);

                let room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                if room.host_id != host_id {
                    return Err(Error::NotHost {
                        action: "transfer the host role",
                    });
                }
                if room.status != RoomStatus::Waiting {
                    return Err(Error::InvalidState {
                        current: room.status,
                        required: RoomStatus::Waiting,
                        action: "transfer the host role",
                    });
                }
                if target_id == host_id {
                    return Err(Error::Validation("target is already the host".into()));
                }
                players
                    .find_active(room_id, target_id)?
                    .ok_or(Error::PlayerNotInRoom {
                        room_id,
                        user_id: target_id,
                    })?;

                players.set_role(room_id, host_id, PlayerRole::Player)?;
                players.set_role(room_id, target_id, PlayerRole::Host)?;
                rooms.set_host(room_id, target_id)?;

                let room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                let roster = players.list_active(room_id)?;
                invariants::assert_roster_invariants(&room, &roster);
                Ok(room)
            })
            .await?;

        info!(room_id = %room_id, new_host = %target_id, "host role transferred");
        self.shared.rebuild_summary(&room).await;
        Ok(())
    }

    /// Flip a member's ready flag.
    ///
    /// When the toggle makes everyone ready and the room has quorum, the
    /// game is started on the host's behalf. A failed auto-start leaves
    /// the room waiting and is reported in logs, not to the caller.
    #[instrument(skip(self), fields(room_id = %room_id, user_id = %user_id, is_ready))]
    pub async fn set_ready(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        is_ready: bool,
    ) -> Result<ReadyStatus> {
        let (room, player, ready_count, total_count) = self
            .shared
            .db
            .write(move |tx| {
                let rooms = RoomStore::new(tx);
                let players = PlayerStore::new(tx);

                let room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                if room.status != RoomStatus::Waiting {
                    return Err(Error::InvalidState {
                        current: room.status,
                        required: RoomStatus::Waiting,
                        action: "change readiness",
                    });
                }
                let seat = players
                    .find_active(room_id, user_id)?
                    .ok_or(Error::PlayerNotInRoom { room_id, user_id })?;
                if seat.role == PlayerRole::Spectator {
                    return Err(Error::Validation("spectators cannot ready up".into()));
                }

                players.set_ready(room_id, user_id, is_ready)?;
                let player = players
                    .find_active(room_id, user_id)?
                    .ok_or(Error::PlayerNotInRoom { room_id, user_id })?;
                let (ready_count, total_count) = players.ready_tally(room_id)?;
                Ok((room, player, ready_count, total_count))
            })
            .await?;

        let all_ready = total_count > 0 && ready_count == total_count;
        self.shared.events.publish(RoomEvent::player_ready(
            room_id,
            &player,
            ready_count,
            total_count,
            all_ready,
        ));

        let mut started = None;
        if is_ready && all_ready && total_count >= self.shared.config.min_players_to_start {
            match self.lifecycle.start_room(room_id, room.host_id).await {
                Ok(handle) => started = Some(handle),
                Err(e) => {
                    warn!(
                        room_id = %room_id,
                        error = %e,
                        "everyone is ready but the start failed, room stays open"
                    );
                }
            }
        }

        Ok(ReadyStatus {
            ready_count,
            total_count,
            all_ready,
            started,
        })
    }
}
