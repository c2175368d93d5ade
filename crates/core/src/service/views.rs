//! Read-view assembly
//!
//! Views are built from authoritative store rows; display names come from
//! the upstream services. Enrichment is best effort: a gateway hiccup costs
//! a name, never the response.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::warn;
use uuid::Uuid;

use crate::gateway::{describe_packs, ContentCatalog, IdentityGateway};
use crate::models::{Room, RoomPlayer, RoomSettings, RoomSummary, RoomView};

#[derive(Clone)]
pub struct ViewAssembler {
    identity: Arc<dyn IdentityGateway>,
    catalog: Arc<dyn ContentCatalog>,
}

impl ViewAssembler {
    pub fn new(identity: Arc<dyn IdentityGateway>, catalog: Arc<dyn ContentCatalog>) -> Self {
        Self { identity, catalog }
    }

    /// Full detail view for one room
    pub async fn room_view(
        &self,
        room: &Room,
        roster: &[RoomPlayer],
        settings: Option<&RoomSettings>,
    ) -> RoomView {
        let mut view = RoomView::from_parts(room, roster, settings);

        // The roster already names the host; only ask upstream when the
        // host row is gone, as in a closed room
        view.summary.host_username = match roster.iter().find(|p| p.user_id == room.host_id) {
            Some(host) => Some(host.username.clone()),
            None => self.resolve_username(room.host_id).await,
        };
        view.summary.pack_name = self.pack_name(room.pack_id).await;
        view
    }

    /// Summaries for a page of rooms, one batched sweep per service
    pub async fn summaries(&self, rooms: &[Room]) -> Vec<RoomSummary> {
        let packs = describe_packs(self.catalog.as_ref(), rooms.iter().map(|r| r.pack_id)).await;
        let hosts = self
            .resolve_usernames(rooms.iter().map(|r| r.host_id))
            .await;

        rooms
            .iter()
            .map(|room| {
                let mut summary = RoomSummary::from_room(room);
                summary.pack_name = packs.get(&room.pack_id).map(|p| p.name.clone());
                summary.host_username = hosts.get(&room.host_id).cloned();
                summary
            })
            .collect()
    }

    /// Enriched summary for a single room
    pub async fn summary(&self, room: &Room) -> RoomSummary {
        let mut summary = RoomSummary::from_room(room);
        let (host, pack) = tokio::join!(
            self.resolve_username(room.host_id),
            self.pack_name(room.pack_id)
        );
        summary.host_username = host;
        summary.pack_name = pack;
        summary
    }

    async fn pack_name(&self, pack_id: Uuid) -> Option<String> {
        match self.catalog.describe(pack_id).await {
            Ok(info) => Some(info.name),
            Err(e) => {
                warn!(pack_id = %pack_id, error = %e, "pack lookup failed, omitting name");
                None
            }
        }
    }

    async fn resolve_username(&self, user_id: Uuid) -> Option<String> {
        match self.identity.resolve(user_id).await {
            Ok(profile) => Some(profile.username),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "identity lookup failed, omitting name");
                None
            }
        }
    }

    async fn resolve_usernames(
        &self,
        ids: impl Iterator<Item = Uuid>,
    ) -> HashMap<Uuid, String> {
        let unique: HashSet<Uuid> = ids.collect();
        let lookups = unique
            .into_iter()
            .map(|id| async move { (id, self.resolve_username(id).await) });

        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(id, name)| name.map(|n| (id, n)))
            .collect()
    }
}
