//! UseCase: メッセージ送信処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendMessageUseCase::execute() メソッド
//! - メッセージ送信処理（履歴への追加、上限での切り詰め、入力中表示の解除、配信）
//!
//! ### なぜこのテストが必要か
//! - ビジネスロジックの検証：保持件数が上限を超えず、最新のものが送信順に残る
//! - キックされたユーザーが送信できないことを保証
//! - 配信に失敗しても送信そのものは成功することを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：メッセージ送信と配信
//! - 異常系：存在しないルーム、キックされた送信者
//! - エッジケース：150 件連続送信、配信の失敗

use std::sync::Arc;

use crate::domain::{
    AppendOutcome, DisplayName, Message, MessageAuthor, MessageDetails, MessageId,
    MessageIdFactory, MessagePayload, RoomCode, default_avatar_url,
};

use super::{
    classification::ClassificationQueue, error::RoomError, lifecycle::RoomLifecycle,
    update_message_details::UpdateMessageDetailsUseCase,
};

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    lifecycle: Arc<RoomLifecycle>,
    details: UpdateMessageDetailsUseCase,
    /// コード分類キュー（未設定なら分類しない）
    classification: Option<ClassificationQueue>,
}

impl SendMessageUseCase {
    /// 新しい SendMessageUseCase を作成
    pub fn new(lifecycle: Arc<RoomLifecycle>, classification: Option<ClassificationQueue>) -> Self {
        Self {
            details: UpdateMessageDetailsUseCase::new(lifecycle.clone()),
            lifecycle,
            classification,
        }
    }

    /// メッセージ送信を実行
    ///
    /// # Arguments
    ///
    /// * `code` - 送信先のルーム
    /// * `sender` - 送信者の表示名
    /// * `avatar_url` - 送信者のアバター（未指定なら表示名から生成）
    /// * `payload` - 検証済みのメッセージ内容
    ///
    /// # Returns
    ///
    /// * `Ok(Message)` - 作成されたメッセージ（分類の完了は待たない）
    /// * `Err(RoomError::NotFound)` - ルームが存在しない・期限切れ
    /// * `Err(RoomError::Forbidden)` - 送信者がキックされている
    pub async fn execute(
        &self,
        code: &RoomCode,
        sender: DisplayName,
        avatar_url: Option<String>,
        payload: MessagePayload,
    ) -> Result<Message, RoomError> {
        self.lifecycle.live_meta(code).await?;

        // 1. id と送信時刻を割り当てる
        let avatar_url = avatar_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_avatar_url(&sender));
        let message = Message::new(
            MessageIdFactory::generate(),
            MessageAuthor {
                name: sender,
                avatar_url,
            },
            payload,
            self.lifecycle.now(),
        );

        // 2. キック確認・追加・切り詰め・入力中表示の解除を 1 ステップで実行
        let outcome = self
            .lifecycle
            .within_deadline(self.lifecycle.store().append_message(
                code,
                &message,
                self.lifecycle.policy().max_messages,
            ))
            .await?;
        match outcome {
            AppendOutcome::Appended => {}
            AppendOutcome::RoomMissing => return Err(RoomError::NotFound),
            AppendOutcome::SenderKicked => {
                return Err(RoomError::Forbidden(
                    "you were removed from this room".to_string(),
                ));
            }
        }
        tracing::debug!("'{}' sent message '{}' to '{}'", message.user.name, message.id, code);

        // 3. スナップショットを配信
        self.lifecycle.publish_current(code).await;

        // 4. コードブロックなら分類キューに積む（結果は待たない）
        if let Some(queue) = &self.classification {
            queue.enqueue(code, &message);
        }

        Ok(message)
    }

    /// 分類結果をメッセージに反映
    pub async fn update_details(
        &self,
        code: &RoomCode,
        message_id: &MessageId,
        details: &MessageDetails,
    ) -> Result<bool, RoomError> {
        self.details.execute(code, message_id, details).await
    }
}
