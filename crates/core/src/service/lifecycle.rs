//! Room lifecycle: creation, start orchestration, configuration, closure
//!
//! Status changes go through guarded storage transitions, so two racing
//! starts or closes resolve to one winner and one clean error. The game
//! session gateway is only ever called while the room holds the
//! `starting` claim; a failed call rolls the claim back.

use std::sync::Arc;

use tokio::task;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::RoomEvent;
use crate::gateway::{
    ContentCatalog, GameSessionGateway, GatewayError, IdentityGateway, NewSession, RetryPolicy,
    RosterEntry, SessionHandle,
};
use crate::invariants;
use crate::models::{
    hash_password, CloseReason, CreateRoomRequest, PlayerRole, Room, RoomPlayer, RoomSettings,
    RoomStatus, RoomSummary, RoomView, SettingsView, UpdateRoomRequest,
};
use crate::storage::{PlayerStore, RoomStore, SettingsStore};

use super::codes::RoomCodeGenerator;
use super::Shared;

/// Create, configure, start and close rooms
#[derive(Clone)]
pub struct LifecycleService {
    shared: Shared,
    identity: Arc<dyn IdentityGateway>,
    catalog: Arc<dyn ContentCatalog>,
    games: Arc<dyn GameSessionGateway>,
    codes: RoomCodeGenerator,
    retry: RetryPolicy,
}

impl LifecycleService {
    pub(crate) fn new(
        shared: Shared,
        identity: Arc<dyn IdentityGateway>,
        catalog: Arc<dyn ContentCatalog>,
        games: Arc<dyn GameSessionGateway>,
    ) -> Self {
        let codes = RoomCodeGenerator::new(&shared.config);
        let retry = RetryPolicy::from_config(&shared.config.retry);
        Self {
            shared,
            identity,
            catalog,
            games,
            codes,
            retry,
        }
    }

    /// Create a room with the caller as host.
    ///
    /// The pack is validated upstream first, then the room, its settings
    /// and the host's seat are written in one transaction. The join code
    /// is unique among open rooms at insert time.
    #[instrument(skip(self, request), fields(host_id = %host_id, pack_id = %request.pack_id))]
    pub async fn create_room(
        &self,
        host_id: Uuid,
        request: CreateRoomRequest,
    ) -> Result<RoomView> {
        invariants::assert_user_id_valid(host_id, "create_room");
        request.validate(&self.shared.config)?;
        self.check_pack(request.pack_id, host_id).await?;

        let host = self.identity.resolve(host_id).await.map_err(|e| match e {
            GatewayError::NotFound(_) => Error::UserNotFound(host_id),
            other => Error::upstream("identity", other),
        })?;

        let code = self.codes.generate_unique(&self.shared.db).await?;

        let password_hash = match request.password.clone() {
            Some(password) => {
                let hashed = task::spawn_blocking(move || hash_password(&password))
                    .await
                    .map_err(|e| Error::Internal(format!("hashing task failed: {e}")))??;
                Some(hashed)
            }
            None => None,
        };

        let username = host.username.clone();
        let avatar_url = host.avatar_url.clone();
        let (room, roster, settings) = self
            .shared
            .db
            .write(move |tx| {
                let rooms = RoomStore::new(tx);
                let players = PlayerStore::new(tx);
                let settings_store = SettingsStore::new(tx);

                if players.find_active_by_user(host_id)?.is_some() {
                    return Err(Error::AlreadyInRoom(host_id));
                }

                let mut room = Room::new(
                    code,
                    request.name.trim().to_string(),
                    host_id,
                    request.pack_id,
                )
                .with_password_hash(password_hash);
                if let Some(max) = request.max_players {
                    room = room.with_capacity(max);
                }
                if let Some(public) = request.is_public {
                    room = room.with_visibility(public);
                }
                rooms.create(&room)?;

                let mut settings = RoomSettings::new(room.id);
                if let Some(patch) = &request.settings {
                    settings.apply(patch);
                }
                settings_store.create(&settings)?;

                players.insert(
                    &RoomPlayer::new(room.id, host_id, username, PlayerRole::Host)
                        .with_avatar(avatar_url),
                )?;
                rooms.set_player_count(room.id, 1)?;

                let room = rooms
                    .find_by_id(room.id)?
                    .ok_or(Error::RoomNotFound(room.id))?;
                let roster = players.list_active(room.id)?;
                invariants::assert_room_invariants(&room);
                invariants::assert_roster_invariants(&room, &roster);
                Ok((room, roster, settings))
            })
            .await?;

        let pack_name = match self.catalog.describe(room.pack_id).await {
            Ok(info) => Some(info.name),
            Err(e) => {
                warn!(pack_id = %room.pack_id, error = %e, "pack lookup failed after create");
                None
            }
        };

        let mut summary = RoomSummary::from_room(&room);
        summary.host_username = Some(host.username.clone());
        summary.pack_name = pack_name.clone();
        self.shared.cache.put_room(summary);
        self.shared.cache.seat(host_id, room.id);

        self.shared.events.audit_only(RoomEvent::room_created(
            room.id,
            host_id,
            &host.username,
            &room.code,
            room.pack_id,
            pack_name.clone(),
        ));

        let mut view = RoomView::from_parts(&room, &roster, Some(&settings));
        view.summary.host_username = Some(host.username);
        view.summary.pack_name = pack_name;
        Ok(view)
    }

    /// Start the game for a room.
    ///
    /// The room is claimed with a `waiting -> starting` transition before
    /// the session gateway is called, so concurrent starts collapse to one
    /// call. Gateway failure rolls the room back to `waiting`.
    #[instrument(skip(self), fields(room_id = %room_id, actor_id = %actor_id))]
    pub async fn start_room(&self, room_id: Uuid, actor_id: Uuid) -> Result<SessionHandle> {
        let (room, roster, settings) = self
            .shared
            .db
            .read(move |db| {
                let room = db
                    .rooms()
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                let roster = db.players().list_active(room_id)?;
                let settings = db.settings().find_by_room(room_id)?;
                Ok((room, roster, settings))
            })
            .await?;

        if room.host_id != actor_id {
            return Err(Error::NotHost {
                action: "start the game",
            });
        }
        if room.status != RoomStatus::Waiting {
            return Err(Error::InvalidState {
                current: room.status,
                required: RoomStatus::Waiting,
                action: "start the game",
            });
        }
        let player_count = roster
            .iter()
            .filter(|p| p.role != PlayerRole::Spectator)
            .count() as i64;
        let required = self.shared.config.min_players_to_start;
        if player_count < required {
            return Err(Error::InsufficientPlayers {
                current: player_count,
                required,
            });
        }

        let claimed = self
            .shared
            .db
            .write(move |tx| {
                RoomStore::new(tx).transition_status(
                    room_id,
                    RoomStatus::Waiting,
                    RoomStatus::Starting,
                    "start the game",
                )
            })
            .await?;

        let session = NewSession {
            room_id,
            pack_id: claimed.pack_id,
            roster: roster
                .iter()
                .map(|p| RosterEntry {
                    user_id: p.user_id,
                    username: p.username.clone(),
                    role: p.role,
                })
                .collect(),
            settings: settings
                .as_ref()
                .map(SettingsView::from)
                .unwrap_or_else(|| SettingsView::from(&RoomSettings::new(room_id))),
        };

        match self
            .retry
            .run_once("game.create", self.games.create(session))
            .await
        {
            Ok(handle) => {
                let room = self
                    .shared
                    .db
                    .write(move |tx| {
                        RoomStore::new(tx).transition_status(
                            room_id,
                            RoomStatus::Starting,
                            RoomStatus::Playing,
                            "finish starting the game",
                        )
                    })
                    .await?;
                self.shared.events.publish(RoomEvent::game_started(
                    room_id,
                    &handle.session_id,
                    &handle.connect_url,
                ));
                self.shared.refresh_summary(&room).await;
                Ok(handle)
            }
            Err(gateway_err) => {
                let rollback = self
                    .shared
                    .db
                    .write(move |tx| {
                        RoomStore::new(tx).transition_status(
                            room_id,
                            RoomStatus::Starting,
                            RoomStatus::Waiting,
                            "roll back the start",
                        )
                    })
                    .await;
                if let Err(rollback_err) = rollback {
                    error!(
                        room_id = %room_id,
                        error = %rollback_err,
                        "room stuck after failed start, manual cleanup needed"
                    );
                }
                Err(Error::upstream("game", gateway_err))
            }
        }
    }

    /// Host-only partial update of capacity, visibility, password and
    /// gameplay settings. Capacity can never drop below the seated count.
    #[instrument(skip(self, request), fields(room_id = %room_id, actor_id = %actor_id))]
    pub async fn update_settings(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        request: UpdateRoomRequest,
    ) -> Result<RoomView> {
        request.validate(&self.shared.config)?;

        let password_hash = match request.password.clone() {
            Some(password) => {
                let hashed = task::spawn_blocking(move || hash_password(&password))
                    .await
                    .map_err(|e| Error::Internal(format!("hashing task failed: {e}")))??;
                Some(hashed)
            }
            None => None,
        };

        let (room, roster, settings) = self
            .shared
            .db
            .write(move |tx| {
                let rooms = RoomStore::new(tx);
                let players = PlayerStore::new(tx);
                let settings_store = SettingsStore::new(tx);

                let mut room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                if room.host_id != actor_id {
                    return Err(Error::NotHost {
                        action: "update the room",
                    });
                }
                if room.status != RoomStatus::Waiting {
                    return Err(Error::InvalidState {
                        current: room.status,
                        required: RoomStatus::Waiting,
                        action: "update the room",
                    });
                }

                if let Some(max) = request.max_players {
                    let seated = players.count_active(room_id)?;
                    if max < seated {
                        return Err(Error::Validation(format!(
                            "cannot shrink capacity to {max}, {seated} players are seated"
                        )));
                    }
                    room.max_players = max;
                }
                if let Some(public) = request.is_public {
                    room.is_public = public;
                }
                if password_hash.is_some() {
                    room.password_hash = password_hash;
                } else if request.clear_password {
                    room.password_hash = None;
                }
                rooms.update_config(&room)?;

                let mut settings = match settings_store.find_by_room(room_id)? {
                    Some(existing) => existing,
                    None => {
                        let fresh = RoomSettings::new(room_id);
                        settings_store.create(&fresh)?;
                        fresh
                    }
                };
                if let Some(patch) = &request.gameplay {
                    settings.apply(patch);
                    settings_store.update(&settings)?;
                }

                let room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                let roster = players.list_active(room_id)?;
                invariants::assert_room_invariants(&room);
                Ok((room, roster, settings))
            })
            .await?;

        self.shared.refresh_summary(&room).await;
        self.shared
            .events
            .publish(RoomEvent::settings_updated(room_id, &settings));

        Ok(self
            .shared
            .views
            .room_view(&room, &roster, Some(&settings))
            .await)
    }

    /// Host-only closure of a waiting room. Every seat is released so the
    /// players are free to join elsewhere immediately.
    #[instrument(skip(self), fields(room_id = %room_id, actor_id = %actor_id))]
    pub async fn close_room(&self, room_id: Uuid, actor_id: Uuid) -> Result<()> {
        self.shared
            .db
            .write(move |tx| {
                let rooms = RoomStore::new(tx);
                let players = PlayerStore::new(tx);

                let room = rooms
                    .find_by_id(room_id)?
                    .ok_or(Error::RoomNotFound(room_id))?;
                if room.host_id != actor_id {
                    return Err(Error::NotHost {
                        action: "close the room",
                    });
                }
                rooms.transition_status(
                    room_id,
                    RoomStatus::Waiting,
                    RoomStatus::Cancelled,
                    "close the room",
                )?;
                players.mark_all_left(room_id, chrono::Utc::now())?;
                rooms.set_player_count(room_id, 0)?;
                Ok(())
            })
            .await?;

        self.shared.retire_room(room_id, CloseReason::HostClosed);
        Ok(())
    }

    async fn check_pack(&self, pack_id: Uuid, user_id: Uuid) -> Result<()> {
        let verdict = self
            .catalog
            .validate(pack_id, user_id)
            .await
            .map_err(|e| Error::upstream("catalog", e))?;
        if !verdict.exists {
            return Err(Error::PackNotFound(pack_id));
        }
        if !verdict.approved {
            return Err(Error::PackNotApproved(pack_id));
        }
        if !verdict.owned_by_user {
            return Err(Error::PackNotOwned(pack_id));
        }
        Ok(())
    }
}
