//! In-process fan-out: one `broadcast` channel per observed room.
//!
//! A channel exists only while someone subscribes to it. The last
//! subscription to be dropped removes the entry, so abandoned rooms hold no
//! memory.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::domain::{PublishError, RoomCode, RoomEvent, RoomEventPublisher, RoomSubscription};

/// プロセス内 broadcast チャネルを使った RoomEventPublisher 実装
#[derive(Debug, Clone)]
pub struct BroadcastRoomEvents {
    channels: Arc<DashMap<RoomCode, broadcast::Sender<RoomEvent>>>,
    capacity: usize,
}

impl BroadcastRoomEvents {
    /// Buffered events per room before a slow observer starts lagging
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Hand an event to the local observers of its room.
    ///
    /// Returns how many receivers got it.
    pub fn deliver(&self, event: RoomEvent) -> usize {
        let code = event.code().clone();
        let delivered = match self.channels.get(&code) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => return 0,
        };
        if delivered == 0 {
            self.channels
                .remove_if(&code, |_, sender| sender.receiver_count() == 0);
        }
        delivered
    }

    /// Open a subscription on a room's channel, creating the channel on demand.
    pub fn open(&self, code: &RoomCode) -> RoomSubscription {
        let receiver = self
            .channels
            .entry(code.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let channels = Arc::clone(&self.channels);
        let released = code.clone();
        RoomSubscription::new(code.clone(), receiver, move || {
            let removed = channels
                .remove_if(&released, |_, sender| sender.receiver_count() == 0)
                .is_some();
            if removed {
                tracing::debug!("Channel '{}' released", released.channel_name());
            }
        })
    }

    /// Number of rooms with at least one live channel
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of subscriptions currently open on a room
    pub fn receiver_count(&self, code: &RoomCode) -> usize {
        self.channels
            .get(code)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for BroadcastRoomEvents {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl RoomEventPublisher for BroadcastRoomEvents {
    async fn publish(&self, event: RoomEvent) -> Result<usize, PublishError> {
        Ok(self.deliver(event))
    }

    async fn subscribe(&self, code: &RoomCode) -> Result<RoomSubscription, PublishError> {
        Ok(self.open(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Room, RoomMeta, SubscriptionRecv, Timestamp};

    fn code(value: &str) -> RoomCode {
        RoomCode::new(value.to_string()).unwrap()
    }

    fn snapshot(value: &str) -> RoomEvent {
        RoomEvent::snapshot(Room::new(RoomMeta::new(
            code(value),
            Timestamp::new(0),
            1_000,
            false,
            None,
        )))
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_of_the_room() {
        // テスト項目: 同じルームの全購読者にイベントが届き、他のルームには届かない
        // given (前提条件):
        let events = BroadcastRoomEvents::default();
        let mut first = events.subscribe(&code("1234")).await.unwrap();
        let mut second = events.subscribe(&code("1234")).await.unwrap();
        let other = events.subscribe(&code("4321")).await.unwrap();

        // when (操作):
        let delivered = events.publish(snapshot("1234")).await.unwrap();

        // then (期待する結果):
        assert_eq!(delivered, 2);
        assert_eq!(first.recv().await, SubscriptionRecv::Event(snapshot("1234")));
        assert_eq!(second.recv().await, SubscriptionRecv::Event(snapshot("1234")));
        assert_eq!(events.receiver_count(other.code()), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_delivers_nothing() {
        // テスト項目: 購読者がいないルームへの配信は 0 件で、チャネルも作られない
        // given (前提条件):
        let events = BroadcastRoomEvents::default();

        // when (操作):
        let delivered = events.publish(snapshot("1234")).await.unwrap();

        // then (期待する結果):
        assert_eq!(delivered, 0);
        assert_eq!(events.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_last_subscription_releases_channel() {
        // テスト項目: 最後の購読が破棄されるとチャネルが解放される
        // given (前提条件):
        let events = BroadcastRoomEvents::default();
        let first = events.subscribe(&code("1234")).await.unwrap();
        let second = events.subscribe(&code("1234")).await.unwrap();

        // when (操作):
        drop(first);

        // then (期待する結果):
        assert_eq!(events.channel_count(), 1);
        assert_eq!(events.receiver_count(&code("1234")), 1);

        drop(second);
        assert_eq!(events.channel_count(), 0);
    }

    #[test]
    fn test_concurrent_drops_release_channel() {
        // テスト項目: 複数の購読が同時に破棄されてもチャネルが残らない
        // given (前提条件):
        let events = BroadcastRoomEvents::default();
        const SUBSCRIBERS: usize = 8;

        for _ in 0..500 {
            let barrier = Arc::new(std::sync::Barrier::new(SUBSCRIBERS));
            let handles: Vec<_> = (0..SUBSCRIBERS)
                .map(|_| {
                    let subscription = events.open(&code("1234"));
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        // when (操作):
                        drop(subscription);
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            // then (期待する結果):
            assert_eq!(events.channel_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_recv_after_release_reports_closed() {
        // テスト項目: 購読していたチャネルが無くなると Closed を受け取る
        // given (前提条件):
        let events = BroadcastRoomEvents::default();
        let mut subscription = events.subscribe(&code("1234")).await.unwrap();

        // when (操作):
        events.channels.clear();

        // then (期待する結果):
        assert_eq!(subscription.recv().await, SubscriptionRecv::Closed);
    }

    #[tokio::test]
    async fn test_slow_subscriber_observes_lag() {
        // テスト項目: バッファを超えて読み遅れた購読者は Lagged を受け取る
        // given (前提条件):
        let events = BroadcastRoomEvents::new(2);
        let mut subscription = events.subscribe(&code("1234")).await.unwrap();

        // when (操作):
        for _ in 0..5 {
            events.publish(snapshot("1234")).await.unwrap();
        }

        // then (期待する結果):
        assert!(matches!(subscription.recv().await, SubscriptionRecv::Lagged(_)));
    }
}
