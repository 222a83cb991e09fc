//! UseCase: ルームのライフサイクル管理（作成・取得・パスワード検証・削除・期限切れ掃除）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RoomLifecycle の create_room / get_room / verify_password / delete_room / sweep_expired
//! - 全操作が通るゲート（ストア呼び出しの期限、期限切れ判定、スナップショット配信）
//!
//! ### なぜこのテストが必要か
//! - 期限切れのルームが二度と見えないこと（並行読み込みでも復活しない）を保証
//! - 削除通知がストア削除より先に購読者へ届くことを確認
//! - ストア障害とタイムアウトが NotFound と区別されることを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：公開ルーム・非公開ルームの作成、管理者による削除
//! - 異常系：パスワード不足、管理者以外の削除、ストアの応答なし
//! - エッジケース：期限切れ直後の並行読み込み、配信失敗

use std::{future::Future, sync::Arc, time::Duration};

use roomcast_shared::time::{Clock, timestamp_to_rfc3339};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    DisplayName, Room, RoomCode, RoomCodeFactory, RoomEvent, RoomEventPublisher, RoomMeta,
    RoomPolicy, RoomStore, StoreError, Timestamp,
    password::{hash_password, verify_password},
};

use super::error::RoomError;

/// ルームのライフサイクル管理
pub struct RoomLifecycle {
    /// RoomStore（ルーム状態の保存先）
    store: Arc<dyn RoomStore>,
    /// RoomEventPublisher（ルームイベントの配信先）
    publisher: Arc<dyn RoomEventPublisher>,
    clock: Arc<dyn Clock>,
    policy: RoomPolicy,
}

impl RoomLifecycle {
    /// 新しい RoomLifecycle を作成
    pub fn new(
        store: Arc<dyn RoomStore>,
        publisher: Arc<dyn RoomEventPublisher>,
        clock: Arc<dyn Clock>,
        policy: RoomPolicy,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &RoomPolicy {
        &self.policy
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    pub(crate) fn store(&self) -> &dyn RoomStore {
        self.store.as_ref()
    }

    pub(crate) fn publisher(&self) -> &Arc<dyn RoomEventPublisher> {
        &self.publisher
    }

    /// Run one store call under the store deadline.
    pub(crate) async fn within_deadline<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, RoomError> {
        match tokio::time::timeout(self.policy.store_timeout, call).await {
            Ok(result) => result.map_err(RoomError::from),
            Err(_) => Err(RoomError::TransientStore(format!(
                "store call exceeded {} ms",
                self.policy.store_timeout.as_millis()
            ))),
        }
    }

    /// Idempotent read: retried once after a transient failure.
    async fn read<T, F, Fut>(&self, read: F) -> Result<T, RoomError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match self.within_deadline(read()).await {
            Err(RoomError::TransientStore(reason)) => {
                tracing::warn!("Store read failed ({}), retrying once", reason);
                self.within_deadline(read()).await
            }
            result => result,
        }
    }

    /// ルームを作成し、ルームコードを返す
    ///
    /// # Arguments
    ///
    /// * `is_private` - 非公開ルームかどうか
    /// * `password` - 非公開ルームのパスワード（公開ルームでは無視）
    ///
    /// # Returns
    ///
    /// * `Ok(RoomCode)` - 作成されたルームのコード
    /// * `Err(RoomError::Validation)` - 非公開ルームでパスワードが不足
    pub async fn create_room(
        &self,
        is_private: bool,
        password: Option<&str>,
    ) -> Result<RoomCode, RoomError> {
        // 1. 入力検証（ストアへの書き込み前）
        let password_hash = if is_private {
            let password = password.unwrap_or_default();
            if password.chars().count() < self.policy.min_password_len {
                return Err(RoomError::Validation(format!(
                    "a private room needs a password of at least {} characters",
                    self.policy.min_password_len
                )));
            }
            let Some(hash) = hash_password(password) else {
                return Err(RoomError::Validation(
                    "a private room needs a password".to_string(),
                ));
            };
            Some(hash)
        } else {
            None
        };

        // 2. 空いているコードが見つかるまで set-if-absent で作成を試みる
        for _ in 0..self.policy.code_attempts {
            let meta = RoomMeta::new(
                RoomCodeFactory::generate(),
                self.now(),
                self.policy.ttl_millis(),
                is_private,
                password_hash.clone(),
            );
            if self
                .within_deadline(self.store.create_room(&meta, self.policy.store_ttl()))
                .await?
            {
                tracing::info!(
                    "Room '{}' created (private: {}), expires at {}",
                    meta.code,
                    is_private,
                    timestamp_to_rfc3339(meta.expires_at.value())
                );
                return Ok(meta.code);
            }
            tracing::debug!("Room code '{}' is taken, retrying", meta.code);
        }

        Err(RoomError::TransientStore(format!(
            "no free room code after {} attempts",
            self.policy.code_attempts
        )))
    }

    /// 現在のルームスナップショットを取得
    ///
    /// 期限切れのルームはここで削除され、`Ok(None)` が返る。
    /// 古い入力中表示と非アクティブなメンバーは除外される。
    pub async fn get_room(&self, code: &RoomCode) -> Result<Option<Room>, RoomError> {
        let Some(room) = self.read(|| self.store.load_room(code)).await? else {
            return Ok(None);
        };
        let now = self.now();
        if room.meta.is_expired(now) {
            self.expire(&room.meta).await;
            return Ok(None);
        }
        Ok(Some(room.prune(now, &self.policy)))
    }

    /// Live metadata of a room, or `NotFound`.
    pub(crate) async fn live_meta(&self, code: &RoomCode) -> Result<RoomMeta, RoomError> {
        let meta = self
            .read(|| self.store.load_meta(code))
            .await?
            .ok_or(RoomError::NotFound)?;
        if meta.is_expired(self.now()) {
            self.expire(&meta).await;
            return Err(RoomError::NotFound);
        }
        Ok(meta)
    }

    /// Lazy expiry. Only the reader whose conditional delete removed this
    /// room instance announces the deletion, so a fresh room that reuses the
    /// code is never told it was deleted.
    async fn expire(&self, meta: &RoomMeta) {
        match self
            .within_deadline(
                self.store
                    .delete_room_if_created_at(&meta.code, meta.created_at),
            )
            .await
        {
            Ok(true) => {
                tracing::info!("Room '{}' expired", meta.code);
                self.publish(RoomEvent::Deleted {
                    code: meta.code.clone(),
                })
                .await;
            }
            Ok(false) => tracing::debug!("Room '{}' was already expired", meta.code),
            Err(err) => tracing::warn!("Failed to expire room '{}': {}", meta.code, err),
        }
    }

    /// 非公開ルームのパスワードを検証（書き込みなし）
    ///
    /// ルームが存在しない・公開ルームの場合は `true`。
    pub async fn verify_password(
        &self,
        code: &RoomCode,
        password: Option<&str>,
    ) -> Result<bool, RoomError> {
        let meta = self.read(|| self.store.load_meta(code)).await?;
        let Some(meta) = meta.filter(|meta| !meta.is_expired(self.now())) else {
            return Ok(true);
        };
        if !meta.is_private {
            return Ok(true);
        }
        let Some(password) = password.filter(|password| !password.is_empty()) else {
            return Ok(false);
        };
        Ok(meta
            .password_hash
            .as_ref()
            .is_some_and(|hash| verify_password(hash, password)))
    }

    /// 管理者によるルーム削除
    ///
    /// 削除通知を配信してからストアを削除する。存在しないルームの削除は成功扱い。
    pub async fn delete_room(
        &self,
        code: &RoomCode,
        requester: &DisplayName,
    ) -> Result<(), RoomError> {
        let meta = match self.live_meta(code).await {
            Ok(meta) => meta,
            Err(RoomError::NotFound) => return Ok(()),
            Err(err) => return Err(err),
        };
        if !meta.is_admin(requester) {
            return Err(RoomError::Forbidden(
                "only the room admin can delete the room".to_string(),
            ));
        }

        // 1. 購読者へ削除を通知
        self.publish(RoomEvent::Deleted { code: code.clone() }).await;

        // 2. ルームの全キーを削除
        self.within_deadline(self.store.delete_room(code)).await?;
        tracing::info!("Room '{}' deleted by '{}'", code, requester);
        Ok(())
    }

    /// 期限切れのルームをまとめて削除し、削除した件数を返す
    pub async fn sweep_expired(&self) -> Result<usize, RoomError> {
        let codes = self.within_deadline(self.store.room_codes()).await?;
        let now = self.now();
        let mut expired = 0;
        for code in codes {
            match self.within_deadline(self.store.load_meta(&code)).await {
                Ok(Some(meta)) if meta.is_expired(now) => {
                    self.expire(&meta).await;
                    expired += 1;
                }
                Ok(_) => {}
                Err(err) => tracing::warn!("Sweep skipped room '{}': {}", code, err),
            }
        }
        Ok(expired)
    }

    /// Run `sweep_expired` every `every` until `cancel` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match self.sweep_expired().await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!("Sweep removed {} expired rooms", count),
                    Err(err) => tracing::warn!("Sweep failed: {}", err),
                }
            }
            tracing::info!("Expiry sweeper stopped");
        })
    }

    /// Re-read the room and publish its snapshot. Fan-out is best-effort:
    /// failures are logged and never reach the caller.
    pub(crate) async fn publish_current(&self, code: &RoomCode) {
        match self.get_room(code).await {
            Ok(Some(room)) => self.publish(RoomEvent::snapshot(room)).await,
            Ok(None) => tracing::debug!("Room '{}' vanished before fan-out", code),
            Err(err) => tracing::warn!("Skipping fan-out for room '{}': {}", code, err),
        }
    }

    async fn publish(&self, event: RoomEvent) {
        let code = event.code().clone();
        match self.publisher.publish(event).await {
            Ok(receivers) => tracing::debug!("Published to '{}' ({} receivers)", code, receivers),
            Err(err) => tracing::warn!("Failed to publish to '{}': {}", code.channel_name(), err),
        }
    }
}
