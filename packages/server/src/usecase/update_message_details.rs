//! UseCase: 分類結果（言語・説明）をメッセージに反映
//!
//! 送信処理とは独立に、分類キューのワーカーから非同期に呼ばれる。

use std::sync::Arc;

use crate::domain::{MessageDetails, MessageId, RoomCode};

use super::{error::RoomError, lifecycle::RoomLifecycle};

/// メッセージ詳細更新のユースケース
pub struct UpdateMessageDetailsUseCase {
    lifecycle: Arc<RoomLifecycle>,
}

impl UpdateMessageDetailsUseCase {
    pub fn new(lifecycle: Arc<RoomLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Merge `details` into a retained message and publish.
    ///
    /// `Ok(false)` when the room is gone or the message has been evicted.
    pub async fn execute(
        &self,
        code: &RoomCode,
        message_id: &MessageId,
        details: &MessageDetails,
    ) -> Result<bool, RoomError> {
        if details.is_empty() {
            return Ok(false);
        }
        match self.lifecycle.live_meta(code).await {
            Ok(_) => {}
            Err(RoomError::NotFound) => return Ok(false),
            Err(err) => return Err(err),
        }

        let updated = self
            .lifecycle
            .within_deadline(
                self.lifecycle
                    .store()
                    .update_message_details(code, message_id, details),
            )
            .await?;
        if updated {
            self.lifecycle.publish_current(code).await;
        } else {
            tracing::debug!("Message '{}' is no longer in room '{}'", message_id, code);
        }
        Ok(updated)
    }
}
