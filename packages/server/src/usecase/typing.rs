//! UseCase: 入力中ステータスの更新
//!
//! 呼び出し側で間引く前提で、ここでは間引きをしない。

use std::sync::Arc;

use crate::domain::{DisplayName, RoomCode};

use super::{error::RoomError, lifecycle::RoomLifecycle};

/// 入力中ステータス更新のユースケース
pub struct TypingUseCase {
    lifecycle: Arc<RoomLifecycle>,
}

impl TypingUseCase {
    pub fn new(lifecycle: Arc<RoomLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Record that `name` is typing now. No-op for an absent room.
    pub async fn execute(&self, code: &RoomCode, name: DisplayName) -> Result<(), RoomError> {
        match self.lifecycle.live_meta(code).await {
            Ok(_) => {}
            Err(RoomError::NotFound) => return Ok(()),
            Err(err) => return Err(err),
        }
        let now = self.lifecycle.now();
        if self
            .lifecycle
            .within_deadline(self.lifecycle.store().set_typing(code, &name, now))
            .await?
        {
            self.lifecycle.publish_current(code).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecase::test_support::{Fixture, name};

    #[tokio::test]
    async fn test_typing_is_visible_then_goes_stale() {
        // テスト項目: 入力中表示は 3 秒間だけスナップショットに含まれる
        // given (前提条件):
        let fixture = Fixture::new();
        let code = fixture.public_room_with_admin("alice").await;

        // when (操作):
        fixture.typing().execute(&code, name("alice")).await.unwrap();

        // then (期待する結果):
        fixture.clock.advance(3_000);
        assert!(fixture.room(&code).await.typing.contains_key(&name("alice")));
        fixture.clock.advance(1);
        assert!(fixture.room(&code).await.typing.is_empty());
    }

    #[tokio::test]
    async fn test_typing_on_absent_room_is_silent() {
        // テスト項目: 存在しないルームへの入力中通知はエラーにならず、ルームも作られない
        // given (前提条件):
        let fixture = Fixture::new();
        let code = RoomCode::new("1000".to_string()).unwrap();

        // when (操作):
        let result = fixture.typing().execute(&code, name("alice")).await;

        // then (期待する結果):
        assert_eq!(result, Ok(()));
        assert!(fixture.stored_meta(&code).await.is_none());
    }
}
