//! The coordinator services and their composition root
//!
//! `Lobby::open` wires storage, cache, events and gateways into three
//! services: lifecycle (create/start/configure/close), membership
//! (join/leave/kick/transfer/ready) and query (listings and lookups).
//! All three share one `Shared` bundle and can be used concurrently.

use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::cache::RoomCache;
use crate::config::LobbyConfig;
use crate::error::Result;
use crate::events::{AuditLog, EventFanout, RoomEvent, RoomSubscription};
use crate::gateway::{
    ContentCatalog, GameSessionGateway, IdentityGateway, RetryPolicy, RetryingCatalog,
    RetryingIdentity,
};
use crate::models::{CloseReason, Room};
use crate::storage::{Database, DbHandle};

mod codes;
mod lifecycle;
mod membership;
mod query;
#[cfg(test)]
pub(crate) mod testing;
mod views;

pub use codes::RoomCodeGenerator;
pub use lifecycle::LifecycleService;
pub use membership::{MembershipService, ReadyStatus};
pub use query::QueryService;
pub use views::ViewAssembler;

/// External service clients the lobby is wired to at startup
pub struct Gateways {
    pub identity: Arc<dyn IdentityGateway>,
    pub catalog: Arc<dyn ContentCatalog>,
    pub games: Arc<dyn GameSessionGateway>,
}

/// Plumbing shared by every service
#[derive(Clone)]
pub(crate) struct Shared {
    pub db: DbHandle,
    pub cache: Arc<RoomCache>,
    pub events: EventFanout,
    pub views: ViewAssembler,
    pub config: Arc<LobbyConfig>,
}

impl Shared {
    /// Refresh the cached summary after a state change. Display names in
    /// the cached copy are kept, so no gateway round-trips happen here.
    pub async fn refresh_summary(&self, room: &Room) {
        let summary = match self.cache.room(room.id) {
            Some(mut cached) => {
                cached.status = room.status;
                cached.current_players = room.current_players;
                cached.max_players = room.max_players;
                cached.is_public = room.is_public;
                cached.has_password = room.has_password();
                cached
            }
            None => self.views.summary(room).await,
        };
        self.cache.put_room(summary);
    }

    /// Rebuild the cached summary from scratch; used when display names
    /// may have changed, as after a host handover
    pub async fn rebuild_summary(&self, room: &Room) {
        let summary = self.views.summary(room).await;
        self.cache.put_room(summary);
    }

    /// Publish the final event for a closed room, terminate its live
    /// streams and drop it from the cache
    pub fn retire_room(&self, room_id: Uuid, reason: CloseReason) {
        self.events
            .publish(RoomEvent::room_closed(room_id, reason));
        self.events.close_room(room_id);
        self.cache.remove_room(room_id);
    }
}

/// The assembled lobby coordinator
pub struct Lobby {
    lifecycle: LifecycleService,
    membership: MembershipService,
    query: QueryService,
    events: EventFanout,
    audit: AuditLog,
}

impl Lobby {
    /// Wire up the full coordinator over an opened database.
    ///
    /// The identity and catalog gateways are wrapped in bounded retries;
    /// the game session gateway is not, since session creation must never
    /// be issued twice for one start.
    #[instrument(skip_all)]
    pub async fn open(config: LobbyConfig, db: Database, gateways: Gateways) -> Result<Self> {
        config.validate()?;

        let policy = RetryPolicy::from_config(&config.retry);
        let identity: Arc<dyn IdentityGateway> =
            Arc::new(RetryingIdentity::new(gateways.identity, policy.clone()));
        let catalog: Arc<dyn ContentCatalog> =
            Arc::new(RetryingCatalog::new(gateways.catalog, policy));

        let audit = AuditLog::open(&config.audit_log_path).await?;
        let events = EventFanout::new(
            config.stream_buffer,
            config.keepalive_interval(),
            audit.handle(),
        );

        let shared = Shared {
            db: DbHandle::new(db),
            cache: Arc::new(RoomCache::new(config.cache_ttl())),
            events: events.clone(),
            views: ViewAssembler::new(identity.clone(), catalog.clone()),
            config: Arc::new(config),
        };

        let lifecycle = LifecycleService::new(
            shared.clone(),
            identity.clone(),
            catalog,
            gateways.games,
        );
        let membership = MembershipService::new(shared.clone(), identity, lifecycle.clone());
        let query = QueryService::new(shared);

        Ok(Self {
            lifecycle,
            membership,
            query,
            events,
            audit,
        })
    }

    pub fn lifecycle(&self) -> &LifecycleService {
        &self.lifecycle
    }

    pub fn membership(&self) -> &MembershipService {
        &self.membership
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    /// Live event stream for one room
    pub fn subscribe(&self, room_id: Uuid) -> RoomSubscription {
        self.events.subscribe(room_id)
    }

    pub fn events(&self) -> &EventFanout {
        &self.events
    }

    /// Tear the lobby down and wait for the audit log to drain.
    ///
    /// The services are dropped first; the audit writer only finishes
    /// once every handle to it is gone.
    pub async fn shutdown(self) {
        let Self {
            lifecycle,
            membership,
            query,
            events,
            audit,
        } = self;
        drop(lifecycle);
        drop(membership);
        drop(query);
        drop(events);
        audit.shutdown().await;
    }
}
