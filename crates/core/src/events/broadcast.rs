//! Per-room live event channels
//!
//! Each room gets its own broadcast channel, created lazily on the first
//! subscription. Slow consumers lag rather than block publishers.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use super::RoomEvent;

/// Registry of live channels keyed by room
pub struct RoomChannels {
    capacity: usize,
    senders: DashMap<Uuid, broadcast::Sender<RoomEvent>>,
}

impl RoomChannels {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            senders: DashMap::new(),
        }
    }

    /// Deliver an event to the room's subscribers; returns how many received
    /// it. A room nobody watches has no channel and costs nothing.
    pub fn send(&self, event: &RoomEvent) -> usize {
        let delivered = match self.senders.get(&event.room_id) {
            Some(sender) => sender.send(event.clone()).unwrap_or(0),
            None => return 0,
        };
        if delivered == 0 {
            self.senders
                .remove_if(&event.room_id, |_, sender| sender.receiver_count() == 0);
        }
        delivered
    }

    pub fn subscribe(&self, room_id: Uuid, keepalive: Duration) -> RoomSubscription {
        let receiver = self
            .senders
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        // The first tick must wait a full period, not fire immediately
        let mut ticker = interval_at(Instant::now() + keepalive, keepalive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        RoomSubscription {
            room_id,
            receiver,
            keepalive: ticker,
        }
    }

    /// Tear down a room's channel; pending events drain, then subscribers
    /// observe the closed stream.
    pub fn close(&self, room_id: Uuid) {
        self.senders.remove(&room_id);
    }

    pub fn active_channels(&self) -> usize {
        self.senders.len()
    }
}

/// What a subscriber sees next on its stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event(RoomEvent),
    KeepAlive,
    Lagged(u64),
    Closed,
}

/// One consumer's view of a room's event stream
pub struct RoomSubscription {
    room_id: Uuid,
    receiver: broadcast::Receiver<RoomEvent>,
    keepalive: Interval,
}

impl RoomSubscription {
    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// Wait for the next stream item. Quiet periods yield keepalives so
    /// transports can prove liveness; once `Closed` is returned the stream
    /// stays closed.
    pub async fn next(&mut self) -> StreamItem {
        tokio::select! {
            result = self.receiver.recv() => match result {
                Ok(event) => StreamItem::Event(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => StreamItem::Lagged(skipped),
                Err(broadcast::error::RecvError::Closed) => StreamItem::Closed,
            },
            _ = self.keepalive.tick() => StreamItem::KeepAlive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CloseReason;

    const NO_KEEPALIVE: Duration = Duration::from_secs(3600);

    fn event(room_id: Uuid) -> RoomEvent {
        RoomEvent::room_closed(room_id, CloseReason::Empty)
    }

    #[tokio::test]
    async fn test_subscribers_share_a_room_stream() {
        let channels = RoomChannels::new(16);
        let room_id = Uuid::new_v4();

        let mut a = channels.subscribe(room_id, NO_KEEPALIVE);
        let mut b = channels.subscribe(room_id, NO_KEEPALIVE);

        let sent = event(room_id);
        assert_eq!(channels.send(&sent), 2);

        assert_eq!(a.next().await, StreamItem::Event(sent.clone()));
        assert_eq!(b.next().await, StreamItem::Event(sent));
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let channels = RoomChannels::new(16);
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut sub = channels.subscribe(watched, NO_KEEPALIVE);
        channels.send(&event(other));

        let sent = event(watched);
        channels.send(&sent);
        assert_eq!(sub.next().await, StreamItem::Event(sent));
    }

    #[tokio::test]
    async fn test_unwatched_room_costs_nothing() {
        let channels = RoomChannels::new(16);
        assert_eq!(channels.send(&event(Uuid::new_v4())), 0);
        assert_eq!(channels.active_channels(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_the_stream_after_draining() {
        let channels = RoomChannels::new(16);
        let room_id = Uuid::new_v4();
        let mut sub = channels.subscribe(room_id, NO_KEEPALIVE);

        let sent = event(room_id);
        channels.send(&sent);
        channels.close(room_id);

        assert_eq!(sub.next().await, StreamItem::Event(sent));
        assert_eq!(sub.next().await, StreamItem::Closed);
        assert_eq!(sub.next().await, StreamItem::Closed);
    }

    #[tokio::test]
    async fn test_slow_consumer_observes_lag() {
        let channels = RoomChannels::new(2);
        let room_id = Uuid::new_v4();
        let mut sub = channels.subscribe(room_id, NO_KEEPALIVE);

        for _ in 0..5 {
            channels.send(&event(room_id));
        }

        match sub.next().await {
            StreamItem::Lagged(skipped) => assert_eq!(skipped, 3),
            other => panic!("expected lag, got {other:?}"),
        }
        assert!(matches!(sub.next().await, StreamItem::Event(_)));
    }

    #[tokio::test]
    async fn test_quiet_stream_emits_keepalives() {
        let channels = RoomChannels::new(16);
        let mut sub = channels.subscribe(Uuid::new_v4(), Duration::from_millis(10));

        assert_eq!(sub.next().await, StreamItem::KeepAlive);
        assert_eq!(sub.next().await, StreamItem::KeepAlive);
    }
}
