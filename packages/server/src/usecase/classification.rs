//! UseCase: コードブロックの言語判定キュー
//!
//! 送信処理から切り離したバックグラウンドのワーカー。分類サービスの失敗は
//! ログに残すだけで、送信者には伝えない。
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - fenced_code() によるコードブロックの判定とフェンスの除去
//! - ClassificationQueue のワーカーによる分類結果の反映
//!
//! ### なぜこのテストが必要か
//! - コードブロックのメッセージだけに言語が付くことを保証
//! - 分類サービスの "unknown" やエラーでメッセージが変化しないことを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：コードブロックの分類
//! - 異常系：分類サービスのエラー
//! - エッジケース：プレーンテキスト、"unknown" 応答

use std::sync::Arc;

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::domain::{
    Classification, CodeClassifier, Message, MessageDetails, MessageId, RoomCode,
};

use super::update_message_details::UpdateMessageDetailsUseCase;

const FENCE: &str = "```";

/// The code inside a fenced message, fences removed.
///
/// Only text whose trimmed form starts with a fence counts as code.
pub fn fenced_code(text: &str) -> Option<String> {
    if !text.trim().starts_with(FENCE) {
        return None;
    }
    let code = text.replace(FENCE, "");
    let code = code.trim();
    (!code.is_empty()).then(|| code.to_string())
}

#[derive(Debug)]
struct ClassificationJob {
    code: RoomCode,
    message_id: MessageId,
    snippet: String,
}

/// Handle for enqueueing messages to classify. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ClassificationQueue {
    sender: mpsc::Sender<ClassificationJob>,
}

impl ClassificationQueue {
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Start the worker. It stops when `cancel` fires or every queue handle
    /// has been dropped.
    pub fn spawn(
        classifier: Arc<dyn CodeClassifier>,
        details: Arc<UpdateMessageDetailsUseCase>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(receiver, classifier, details, cancel));
        (Self { sender }, worker)
    }

    /// Queue `message` if it is a code block. Never waits; a full queue
    /// drops the job.
    pub fn enqueue(&self, code: &RoomCode, message: &Message) -> bool {
        let Some(snippet) = fenced_code(&message.text) else {
            return false;
        };
        let job = ClassificationJob {
            code: code.clone(),
            message_id: message.id.clone(),
            snippet,
        };
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                tracing::warn!(
                    "Classification queue full, skipping message '{}' in '{}'",
                    job.message_id,
                    job.code
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Classification worker stopped, skipping message");
                false
            }
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<ClassificationJob>,
    classifier: Arc<dyn CodeClassifier>,
    details: Arc<UpdateMessageDetailsUseCase>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        classify(job, classifier.as_ref(), &details).await;
    }
    tracing::info!("Classification worker stopped");
}

async fn classify(
    job: ClassificationJob,
    classifier: &dyn CodeClassifier,
    details: &UpdateMessageDetailsUseCase,
) {
    let (language, explanation) = match classifier.classify(&job.snippet).await {
        Ok(Classification::Known {
            language,
            explanation,
        }) => (language, explanation),
        Ok(Classification::Unknown) => {
            tracing::debug!("Message '{}' is not recognizable code", job.message_id);
            return;
        }
        Err(err) => {
            tracing::warn!("Classification of message '{}' failed: {}", job.message_id, err);
            return;
        }
    };

    let update = MessageDetails {
        language: Some(language),
        explanation,
    };
    match details.execute(&job.code, &job.message_id, &update).await {
        Ok(true) => tracing::debug!("Message '{}' classified", job.message_id),
        Ok(false) => {}
        Err(err) => tracing::warn!(
            "Could not store classification of message '{}': {}",
            job.message_id,
            err
        ),
    }
}
