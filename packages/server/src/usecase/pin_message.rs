//! UseCase: メッセージのピン留め・解除（管理者のみ）

use std::sync::Arc;

use crate::domain::{DisplayName, MessageId, RoomCode};

use super::{error::RoomError, lifecycle::RoomLifecycle};

/// ピン留めのユースケース
pub struct PinMessageUseCase {
    lifecycle: Arc<RoomLifecycle>,
}

impl PinMessageUseCase {
    pub fn new(lifecycle: Arc<RoomLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Pin `message_id`, or clear the pin with `None`.
    ///
    /// The id is not checked against the retained messages; an evicted id
    /// simply pins nothing.
    pub async fn execute(
        &self,
        code: &RoomCode,
        admin: &DisplayName,
        message_id: Option<MessageId>,
    ) -> Result<(), RoomError> {
        let meta = self.lifecycle.live_meta(code).await?;
        if !meta.is_admin(admin) {
            return Err(RoomError::Forbidden(
                "only the room admin can pin messages".to_string(),
            ));
        }
        if !self
            .lifecycle
            .within_deadline(self.lifecycle.store().set_pinned(code, message_id))
            .await?
        {
            return Err(RoomError::NotFound);
        }
        self.lifecycle.publish_current(code).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecase::test_support::{Fixture, name};

    fn id(value: &str) -> MessageId {
        MessageId::new(value.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_admin_pins_and_clears() {
        // テスト項目: 管理者はピン留めと解除ができる（存在しない id も許容）
        // given (前提条件):
        let fixture = Fixture::new();
        let code = fixture.public_room_with_admin("alice").await;
        let pin = PinMessageUseCase::new(fixture.lifecycle.clone());

        // when (操作):
        pin.execute(&code, &name("alice"), Some(id("evicted"))).await.unwrap();

        // then (期待する結果):
        let room = fixture.room(&code).await;
        assert_eq!(room.meta.pinned_message_id, Some(id("evicted")));
        assert!(room.pinned_message().is_none());

        pin.execute(&code, &name("alice"), None).await.unwrap();
        assert!(fixture.room(&code).await.meta.pinned_message_id.is_none());
    }

    #[tokio::test]
    async fn test_non_admin_cannot_pin() {
        // テスト項目: 管理者以外のピン留めは Forbidden
        // given (前提条件):
        let fixture = Fixture::new();
        let code = fixture.public_room_with_admin("alice").await;
        let pin = PinMessageUseCase::new(fixture.lifecycle.clone());

        // when (操作):
        let result = pin.execute(&code, &name("bob"), Some(id("m1"))).await;

        // then (期待する結果):
        assert!(matches!(result, Err(RoomError::Forbidden(_))));
        assert!(fixture.room(&code).await.meta.pinned_message_id.is_none());
    }

    #[tokio::test]
    async fn test_pin_on_absent_room_is_not_found() {
        // テスト項目: 存在しないルームのピン留めは NotFound
        // given (前提条件):
        let fixture = Fixture::new();
        let pin = PinMessageUseCase::new(fixture.lifecycle.clone());

        // when (操作):
        let result = pin
            .execute(&RoomCode::new("1000".to_string()).unwrap(), &name("alice"), None)
            .await;

        // then (期待する結果):
        assert_eq!(result, Err(RoomError::NotFound));
    }
}
