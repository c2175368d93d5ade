//! Read-side operations: listings, detail lookups, user seat lookup
//!
//! Listings that match the cache's waiting-room projection are answered
//! from the cache when it has anything to say; everything else goes to
//! the store. Detail lookups are always authoritative.

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{PageRequest, RoomFilter, RoomPage, RoomStatus, RoomSummary, RoomView};

use super::Shared;

/// Read-only room queries
#[derive(Clone)]
pub struct QueryService {
    shared: Shared,
}

impl QueryService {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// List rooms matching the filter, newest first
    #[instrument(skip(self))]
    pub async fn list_rooms(&self, filter: RoomFilter, page: PageRequest) -> Result<RoomPage> {
        if filter.is_cacheable() {
            let cached = self.shared.cache.waiting_rooms();
            if !cached.is_empty() {
                debug!(rooms = cached.len(), "listing served from cache");
                return Ok(page_of(cached, page));
            }
        }

        let effective = filter.status.unwrap_or(RoomStatus::Waiting);
        let (rooms, total) = if filter.joinable_only && effective == RoomStatus::Waiting {
            self.shared
                .db
                .read(move |db| {
                    let rooms = db.rooms().list_public_waiting(page.limit(), page.offset())?;
                    let total = db.rooms().count_public_waiting()?;
                    Ok((rooms, total))
                })
                .await?
        } else {
            self.shared
                .db
                .read(move |db| {
                    let rooms = db
                        .rooms()
                        .list_by_status(effective, page.limit(), page.offset())?;
                    let total = db.rooms().count_by_status(effective)?;
                    Ok((rooms, total))
                })
                .await?
        };

        let summaries = self.shared.views.summaries(&rooms).await;
        if filter.is_cacheable() {
            for summary in &summaries {
                self.shared.cache.put_room(summary.clone());
            }
        }
        Ok(RoomPage {
            rooms: summaries,
            total,
            page: page.page,
            size: page.size,
        })
    }

    /// Full room detail by id
    pub async fn room(&self, room_id: Uuid) -> Result<RoomView> {
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
        Ok(self
            .shared
            .views
            .room_view(&room, &roster, settings.as_ref())
            .await)
    }

    /// Full room detail by join code; codes are matched case-insensitively
    pub async fn room_by_code(&self, code: &str) -> Result<RoomView> {
        let key = code.trim().to_uppercase();
        let (room, roster, settings) = self
            .shared
            .db
            .read(move |db| {
                let room = db
                    .rooms()
                    .find_by_code(&key)?
                    .ok_or_else(|| Error::RoomNotFoundByCode(key.clone()))?;
                let roster = db.players().list_active(room.id)?;
                let settings = db.settings().find_by_room(room.id)?;
                Ok((room, roster, settings))
            })
            .await?;
        Ok(self
            .shared
            .views
            .room_view(&room, &roster, settings.as_ref())
            .await)
    }

    /// The room a user is currently seated in, if any.
    ///
    /// The cached seat index is consulted first but always verified
    /// against the store; a stale index entry is cleared on sight.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn active_room_for_user(&self, user_id: Uuid) -> Result<Option<RoomView>> {
        if let Some(room_id) = self.shared.cache.user_room(user_id) {
            let found = self
                .shared
                .db
                .read(move |db| {
                    let Some(room) = db.rooms().find_by_id(room_id)? else {
                        return Ok(None);
                    };
                    if db.players().find_active(room_id, user_id)?.is_none() {
                        return Ok(None);
                    }
                    let roster = db.players().list_active(room_id)?;
                    let settings = db.settings().find_by_room(room_id)?;
                    Ok(Some((room, roster, settings)))
                })
                .await?;
            match found {
                Some((room, roster, settings)) => {
                    return Ok(Some(
                        self.shared
                            .views
                            .room_view(&room, &roster, settings.as_ref())
                            .await,
                    ));
                }
                None => {
                    debug!(user_id = %user_id, "cached seat was stale, clearing it");
                    self.shared.cache.clear_user(user_id);
                }
            }
        }

        let found = self
            .shared
            .db
            .read(move |db| {
                let Some(seat) = db.players().find_active_by_user(user_id)? else {
                    return Ok(None);
                };
                let Some(room) = db.rooms().find_by_id(seat.room_id)? else {
                    return Ok(None);
                };
                let roster = db.players().list_active(room.id)?;
                let settings = db.settings().find_by_room(room.id)?;
                Ok(Some((room, roster, settings)))
            })
            .await?;

        match found {
            Some((room, roster, settings)) => {
                self.shared.cache.seat(user_id, room.id);
                Ok(Some(
                    self.shared
                        .views
                        .room_view(&room, &roster, settings.as_ref())
                        .await,
                ))
            }
            None => Ok(None),
        }
    }
}

fn page_of(all: Vec<RoomSummary>, page: PageRequest) -> RoomPage {
    let total = all.len() as i64;
    let start = (page.offset() as usize).min(all.len());
    let end = (start + page.limit() as usize).min(all.len());
    RoomPage {
        rooms: all[start..end].to_vec(),
        total,
        page: page.page,
        size: page.size,
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::lobby;
    use crate::error::Error;
    use crate::models::{
        CreateRoomRequest, JoinRoomRequest, PageRequest, RoomFilter, RoomStatus,
    };

    #[tokio::test]
    async fn test_listing_shows_newest_joinable_first() {
        let t = lobby().await;
        let pack = t.catalog.add_pack("Pack");
        for name in ["First Room", "Second Room", "Third Room"] {
            let host = t.identity.add_user(&name.to_lowercase());
            t.lobby
                .lifecycle()
                .create_room(host, CreateRoomRequest::new(name, pack))
                .await
                .unwrap();
        }

        let page = t
            .lobby
            .query()
            .list_rooms(RoomFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        let names: Vec<_> = page.rooms.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Third Room", "Second Room", "First Room"]);
        // Summaries arrive enriched
        assert!(page.rooms.iter().all(|r| r.pack_name.is_some()));
    }

    #[tokio::test]
    async fn test_private_rooms_hide_from_browse_but_answer_by_code() {
        let t = lobby().await;
        let host = t.identity.add_user("ada");
        let pack = t.catalog.add_pack("Pack");
        let mut request = CreateRoomRequest::new("Hidden Room", pack);
        request.is_public = Some(false);
        let view = t
            .lobby
            .lifecycle()
            .create_room(host, request)
            .await
            .unwrap();

        let page = t
            .lobby
            .query()
            .list_rooms(RoomFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);

        // An ops listing by status still sees it
        let page = t
            .lobby
            .query()
            .list_rooms(
                RoomFilter::by_status(RoomStatus::Waiting),
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let code = view.summary.code.clone();
        let found = t
            .lobby
            .query()
            .room_by_code(&code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(found.id(), view.id());

        let err = t
            .lobby
            .query()
            .room_by_code("ZZZZZZ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RoomNotFoundByCode(_)));
    }

    #[tokio::test]
    async fn test_pagination_slices_consistently() {
        let t = lobby().await;
        let pack = t.catalog.add_pack("Pack");
        for i in 0..5 {
            let host = t.identity.add_user(&format!("host{i}"));
            t.lobby
                .lifecycle()
                .create_room(host, CreateRoomRequest::new(format!("Room {i}"), pack))
                .await
                .unwrap();
        }

        let first = t
            .lobby
            .query()
            .list_rooms(RoomFilter::default(), PageRequest::new(0, 2).unwrap())
            .await
            .unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.rooms.len(), 2);

        let last = t
            .lobby
            .query()
            .list_rooms(RoomFilter::default(), PageRequest::new(2, 2).unwrap())
            .await
            .unwrap();
        assert_eq!(last.rooms.len(), 1);

        let past_the_end = t
            .lobby
            .query()
            .list_rooms(RoomFilter::default(), PageRequest::new(9, 2).unwrap())
            .await
            .unwrap();
        assert!(past_the_end.rooms.is_empty());
        assert_eq!(past_the_end.total, 5);
    }

    #[tokio::test]
    async fn test_active_room_lookup_follows_the_user() {
        let t = lobby().await;
        let host = t.identity.add_user("ada");
        let pack = t.catalog.add_pack("Pack");
        let view = t
            .lobby
            .lifecycle()
            .create_room(host, CreateRoomRequest::new("Quiz", pack))
            .await
            .unwrap();
        let room_id = view.id();

        let guest = t.identity.add_user("bert");
        assert!(t
            .lobby
            .query()
            .active_room_for_user(guest)
            .await
            .unwrap()
            .is_none());

        t.lobby
            .membership()
            .join_room(room_id, guest, JoinRoomRequest::default())
            .await
            .unwrap();
        let found = t
            .lobby
            .query()
            .active_room_for_user(guest)
            .await
            .unwrap()
            .expect("guest is seated");
        assert_eq!(found.id(), room_id);

        t.lobby.membership().leave_room(room_id, guest).await.unwrap();
        assert!(t
            .lobby
            .query()
            .active_room_for_user(guest)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_full_rooms_drop_out_of_the_joinable_listing() {
        let t = lobby().await;
        let host = t.identity.add_user("ada");
        let pack = t.catalog.add_pack("Pack");
        let mut request = CreateRoomRequest::new("Tiny Table", pack);
        request.max_players = Some(2);
        let view = t
            .lobby
            .lifecycle()
            .create_room(host, request)
            .await
            .unwrap();

        let page = t
            .lobby
            .query()
            .list_rooms(RoomFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let guest = t.identity.add_user("bert");
        t.lobby
            .membership()
            .join_room(view.id(), guest, JoinRoomRequest::default())
            .await
            .unwrap();

        let page = t
            .lobby
            .query()
            .list_rooms(RoomFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0, "a full room is not joinable");
    }
}
