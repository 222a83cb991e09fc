//! UseCase: ルームへの参加・退出・キック
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - MembershipUseCase::join() / leave() / kick()
//! - 管理者の自動割り当て（最初の参加者のみ）
//!
//! ### なぜこのテストが必要か
//! - 並行した参加でも管理者がちょうど 1 人になることを保証
//! - キックされた名前が再参加・送信できないことを確認
//! - キックの権限チェック（管理者のみ・自分自身は不可）を確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：参加、再参加（最終アクティブ時刻の更新）、退出、キック
//! - 異常系：管理者以外のキック、自分自身のキック、存在しないルーム
//! - エッジケース：同時参加、キックされたユーザーの再参加（無視される）

use std::sync::Arc;

use crate::domain::{DisplayName, JoinOutcome, Member, RoomCode, default_avatar_url};

use super::{error::RoomError, lifecycle::RoomLifecycle};

/// 参加・退出・キックのユースケース
pub struct MembershipUseCase {
    lifecycle: Arc<RoomLifecycle>,
}

impl MembershipUseCase {
    /// 新しい MembershipUseCase を作成
    pub fn new(lifecycle: Arc<RoomLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// ルームに参加（既に参加済みなら最終アクティブ時刻を更新）
    ///
    /// ルームが存在しない場合やキック済みの名前の場合は何もせず `Ok(())`。
    /// 最初の参加者が管理者になる。
    pub async fn join(
        &self,
        code: &RoomCode,
        name: DisplayName,
        avatar_url: Option<String>,
    ) -> Result<(), RoomError> {
        match self.lifecycle.live_meta(code).await {
            Ok(_) => {}
            Err(RoomError::NotFound) => return Ok(()),
            Err(err) => return Err(err),
        }

        let avatar_url = avatar_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_avatar_url(&name));
        let member = Member {
            name,
            avatar_url,
            joined_at: self.lifecycle.now(),
        };
        let outcome = self
            .lifecycle
            .within_deadline(self.lifecycle.store().join_member(code, &member))
            .await?;

        match outcome {
            JoinOutcome::Joined { became_admin } | JoinOutcome::Refreshed { became_admin } => {
                if became_admin {
                    tracing::info!("'{}' joined room '{}' as admin", member.name, code);
                } else if matches!(outcome, JoinOutcome::Joined { .. }) {
                    tracing::info!("'{}' joined room '{}'", member.name, code);
                }
                self.lifecycle.publish_current(code).await;
            }
            JoinOutcome::Kicked => {
                tracing::debug!("Ignoring join of kicked user '{}' in '{}'", member.name, code);
            }
            JoinOutcome::RoomMissing => {}
        }
        Ok(())
    }

    /// ルームから退出（参加情報と入力中表示を削除）
    pub async fn leave(&self, code: &RoomCode, name: &DisplayName) -> Result<(), RoomError> {
        match self.lifecycle.live_meta(code).await {
            Ok(_) => {}
            Err(RoomError::NotFound) => return Ok(()),
            Err(err) => return Err(err),
        }
        if self
            .lifecycle
            .within_deadline(self.lifecycle.store().remove_member(code, name))
            .await?
        {
            tracing::info!("'{}' left room '{}'", name, code);
            self.lifecycle.publish_current(code).await;
        }
        Ok(())
    }

    /// 管理者がユーザーをキック（ルームの寿命が尽きるまで取り消し不可）
    pub async fn kick(
        &self,
        code: &RoomCode,
        admin: &DisplayName,
        target: &DisplayName,
    ) -> Result<(), RoomError> {
        let meta = self.lifecycle.live_meta(code).await?;
        if !meta.is_admin(admin) {
            return Err(RoomError::Forbidden(
                "only the room admin can kick users".to_string(),
            ));
        }
        if admin == target {
            return Err(RoomError::Forbidden(
                "the admin cannot kick themselves".to_string(),
            ));
        }

        if !self
            .lifecycle
            .within_deadline(self.lifecycle.store().kick_member(code, target))
            .await?
        {
            return Err(RoomError::NotFound);
        }
        tracing::info!("'{}' was kicked from room '{}' by '{}'", target, code, admin);
        self.lifecycle.publish_current(code).await;
        Ok(())
    }
}
