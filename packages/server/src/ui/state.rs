//! Shared application state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::usecase::{
    ClassificationQueue, MembershipUseCase, PinMessageUseCase, RoomLifecycle, SendMessageUseCase,
    TypingUseCase, WatchRoomUseCase,
};

/// Shared application state
pub struct AppState {
    /// RoomLifecycle（作成・取得・削除・パスワード検証）
    pub lifecycle: Arc<RoomLifecycle>,
    /// MembershipUseCase（参加・退出・キック）
    pub membership: MembershipUseCase,
    /// SendMessageUseCase（メッセージ送信）
    pub send_message: SendMessageUseCase,
    /// TypingUseCase（入力中表示）
    pub typing: TypingUseCase,
    /// PinMessageUseCase（ピン留め）
    pub pin_message: PinMessageUseCase,
    /// WatchRoomUseCase（SSE / WebSocket の購読）
    pub watch_room: WatchRoomUseCase,
    /// サーバー停止時にキャンセルされ、開いている購読をすべて終わらせる
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every use case around one lifecycle.
    pub fn new(
        lifecycle: Arc<RoomLifecycle>,
        classification: Option<ClassificationQueue>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            membership: MembershipUseCase::new(lifecycle.clone()),
            send_message: SendMessageUseCase::new(lifecycle.clone(), classification),
            typing: TypingUseCase::new(lifecycle.clone()),
            pin_message: PinMessageUseCase::new(lifecycle.clone()),
            watch_room: WatchRoomUseCase::new(lifecycle.clone()),
            lifecycle,
            shutdown,
        }
    }
}
