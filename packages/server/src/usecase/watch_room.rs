//! UseCase: ルームの変更を購読し続ける（SSE / WebSocket の中身）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - WatchRoomUseCase::watch() と RoomWatch::next()
//!
//! ### なぜこのテストが必要か
//! - 購読開始直後に現在のスナップショットが届くことを保証
//! - 削除通知で購読が終わること、通知を取りこぼしても再読み込みで削除に気付くことを確認
//! - キャンセルでチャネルが解放されること（購読のリークが無いこと）を確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：初回スナップショット、変更ごとのスナップショット
//! - 異常系：存在しないルームの購読
//! - エッジケース：削除通知の取りこぼし（無通知の削除）、キャンセル

use std::sync::Arc;

use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;

use crate::domain::{RoomCode, RoomEvent, RoomSubscription, SubscriptionRecv};

use super::{error::RoomError, lifecycle::RoomLifecycle};

/// ルーム購読のユースケース
pub struct WatchRoomUseCase {
    lifecycle: Arc<RoomLifecycle>,
}

impl WatchRoomUseCase {
    pub fn new(lifecycle: Arc<RoomLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Start watching a room.
    ///
    /// The subscription is opened before the initial read, so no change made
    /// after the initial snapshot can be missed. `cancel` ends the watch; it
    /// is meant to be tied to the client connection.
    pub async fn watch(
        &self,
        code: &RoomCode,
        cancel: CancellationToken,
    ) -> Result<RoomWatch, RoomError> {
        let subscription = self.lifecycle.publisher().subscribe(code).await?;
        let room = self
            .lifecycle
            .get_room(code)
            .await?
            .ok_or(RoomError::NotFound)?;
        tracing::debug!("Watching room '{}'", code);
        Ok(RoomWatch {
            code: code.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
            subscription: Some(subscription),
            initial: Some(RoomEvent::snapshot(room)),
            cancel,
            finished: false,
        })
    }
}

enum Wake {
    Cancelled,
    Received(Result<SubscriptionRecv, Elapsed>),
}

/// A live view of one room.
///
/// Yields the initial snapshot, then one event per published change. Silence
/// longer than the liveness timeout, a lagging receiver or a closed channel
/// all make it re-read the room, so a missed deletion still surfaces as
/// [`RoomEvent::Deleted`]. Dropping the watch releases its channel.
pub struct RoomWatch {
    code: RoomCode,
    lifecycle: Arc<RoomLifecycle>,
    subscription: Option<RoomSubscription>,
    initial: Option<RoomEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl RoomWatch {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Next event, or `None` once the room is deleted or the watch cancelled.
    pub async fn next(&mut self) -> Option<RoomEvent> {
        if self.finished {
            return None;
        }
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }

        loop {
            if self.cancel.is_cancelled() {
                self.finish();
                return None;
            }
            if self.subscription.is_none() && !self.resubscribe().await {
                continue;
            }

            let liveness = self.lifecycle.policy().liveness_timeout;
            let wake = match self.subscription.as_mut() {
                Some(subscription) => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => Wake::Cancelled,
                        received = tokio::time::timeout(liveness, subscription.recv()) => {
                            Wake::Received(received)
                        }
                    }
                }
                None => continue,
            };

            match wake {
                Wake::Cancelled => {
                    self.finish();
                    return None;
                }
                Wake::Received(Ok(SubscriptionRecv::Event(event))) => {
                    if event.is_terminal() {
                        self.finish();
                    }
                    return Some(event);
                }
                Wake::Received(Ok(SubscriptionRecv::Lagged(skipped))) => {
                    tracing::debug!("Watch on '{}' lagged by {} events", self.code, skipped);
                }
                Wake::Received(Ok(SubscriptionRecv::Closed)) => {
                    tracing::debug!("Channel of '{}' closed, resubscribing", self.code);
                    self.subscription = None;
                }
                Wake::Received(Err(_)) => {
                    tracing::trace!("Watch on '{}' is silent, re-reading", self.code);
                }
            }

            if let Some(event) = self.refresh().await {
                return Some(event);
            }
        }
    }

    /// Re-read the room. `None` means the read failed and the watch should
    /// keep waiting.
    async fn refresh(&mut self) -> Option<RoomEvent> {
        match self.lifecycle.get_room(&self.code).await {
            Ok(Some(room)) => Some(RoomEvent::snapshot(room)),
            Ok(None) => {
                self.finish();
                Some(RoomEvent::Deleted {
                    code: self.code.clone(),
                })
            }
            Err(err) => {
                tracing::warn!("Watch on '{}' could not re-read: {}", self.code, err);
                None
            }
        }
    }

    /// `false` when resubscribing failed and a backoff has been waited out.
    async fn resubscribe(&mut self) -> bool {
        match self.lifecycle.publisher().subscribe(&self.code).await {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                true
            }
            Err(err) => {
                tracing::warn!("Watch on '{}' could not resubscribe: {}", self.code, err);
                let liveness = self.lifecycle.policy().liveness_timeout;
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(liveness) => {}
                }
                false
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.subscription = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{MessagePayload, RoomPolicy},
        usecase::test_support::{Fixture, name},
    };
    use std::time::Duration;

    #[tokio::test]
    async fn test_watch_starts_with_current_snapshot() {
        // テスト項目: 購読開始直後に現在のスナップショットが届く
        // given (前提条件):
        let fixture = Fixture::new();
        let code = fixture.public_room_with_admin("alice").await;

        // when (操作):
        let mut watch = fixture.watch(&code).await;

        // then (期待する結果):
        match watch.next().await {
            Some(RoomEvent::Snapshot { room }) => {
                assert_eq!(room.meta.admin, Some(name("alice")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_watch_of_absent_room_is_not_found() {
        // テスト項目: 存在しないルームの購読は NotFound で、チャネルは残らない
        // given (前提条件):
        let fixture = Fixture::new();
        let code = RoomCode::new("1000".to_string()).unwrap();

        // when (操作):
        let result = WatchRoomUseCase::new(fixture.lifecycle.clone())
            .watch(&code, CancellationToken::new())
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(RoomError::NotFound)));
        assert_eq!(fixture.events.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_deletion_is_delivered_then_watch_ends() {
        // テスト項目: 削除すると購読者に Deleted が届き、その後は終了する
        // given (前提条件):
        let fixture = Fixture::new();
        let code = fixture.public_room_with_admin("alice").await;
        let mut watch = fixture.watch(&code).await;
        watch.next().await.unwrap();

        // when (操作):
        fixture
            .lifecycle
            .delete_room(&code, &name("alice"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(
            watch.next().await,
            Some(RoomEvent::Deleted { code: code.clone() })
        );
        assert_eq!(watch.next().await, None);
        assert_eq!(fixture.events.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_silent_deletion_is_detected_on_liveness_timeout() {
        // テスト項目: 削除通知が無くても、無通信タイムアウト後の再読み込みで削除に気付く
        // given (前提条件):
        let fixture = Fixture::with_policy(RoomPolicy {
            liveness_timeout: Duration::from_millis(30),
            ..RoomPolicy::default()
        });
        let code = fixture.public_room_with_admin("alice").await;
        let mut watch = fixture.watch(&code).await;
        watch.next().await.unwrap();

        // when (操作): 通知を出さずにストアから直接削除する
        fixture.delete_silently(&code).await;

        // then (期待する結果):
        assert_eq!(
            watch.next().await,
            Some(RoomEvent::Deleted { code: code.clone() })
        );
        assert_eq!(watch.next().await, None);
    }

    #[tokio::test]
    async fn test_liveness_timeout_refreshes_snapshot() {
        // テスト項目: 無通信が続いても、ルームが存在すれば新しいスナップショットが届く
        // given (前提条件):
        let fixture = Fixture::with_policy(RoomPolicy {
            liveness_timeout: Duration::from_millis(30),
            ..RoomPolicy::default()
        });
        let code = fixture.public_room_with_admin("alice").await;
        let mut watch = fixture.watch(&code).await;
        watch.next().await.unwrap();

        // when (操作):
        let event = watch.next().await;

        // then (期待する結果):
        assert!(matches!(event, Some(RoomEvent::Snapshot { .. })));
    }

    #[tokio::test]
    async fn test_cancellation_ends_watch_and_releases_channel() {
        // テスト項目: キャンセルすると待機中の next() が終わり、チャネルが解放される
        // given (前提条件):
        let fixture = Fixture::new();
        let code = fixture.public_room_with_admin("alice").await;
        let cancel = CancellationToken::new();
        let mut watch = WatchRoomUseCase::new(fixture.lifecycle.clone())
            .watch(&code, cancel.clone())
            .await
            .unwrap();
        watch.next().await.unwrap();
        assert_eq!(fixture.events.receiver_count(&code), 1);

        // when (操作):
        let waiting = tokio::spawn(async move { watch.next().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        // then (期待する結果):
        let ended = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("watch ends promptly")
            .unwrap();
        assert_eq!(ended, None);
        assert_eq!(fixture.events.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_watch_releases_channel() {
        // テスト項目: RoomWatch を破棄するとチャネルが解放される
        // given (前提条件):
        let fixture = Fixture::new();
        let code = fixture.public_room_with_admin("alice").await;
        let watch = fixture.watch(&code).await;
        assert_eq!(fixture.events.channel_count(), 1);

        // when (操作):
        drop(watch);

        // then (期待する結果):
        assert_eq!(fixture.events.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_each_mutation_yields_a_snapshot() {
        // テスト項目: 変更のたびに新しいスナップショットが届く
        // given (前提条件):
        let fixture = Fixture::new();
        let code = fixture.public_room_with_admin("alice").await;
        let mut watch = fixture.watch(&code).await;
        watch.next().await.unwrap();

        // when (操作):
        fixture
            .send_message()
            .execute(
                &code,
                name("alice"),
                None,
                MessagePayload::new(Some("one".to_string()), None).unwrap(),
            )
            .await
            .unwrap();
        fixture.typing().execute(&code, name("alice")).await.unwrap();

        // then (期待する結果):
        let Some(RoomEvent::Snapshot { room: first }) = watch.next().await else {
            panic!("expected a snapshot");
        };
        let Some(RoomEvent::Snapshot { room: second }) = watch.next().await else {
            panic!("expected a snapshot");
        };
        assert_eq!(first.messages.len(), 1);
        assert!(first.typing.is_empty());
        assert!(second.typing.contains_key(&name("alice")));
    }
}
