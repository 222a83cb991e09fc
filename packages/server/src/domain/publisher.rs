//! Room event publisher trait and the subscription handle.
//!
//! Each room has one logical broadcast channel (`room:{code}:events`). A
//! mutation publishes the full current snapshot; deletion publishes a
//! terminal `Deleted` event before storage is removed.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{entity::Room, error::PublishError, value_object::RoomCode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoomEvent {
    Snapshot { room: Box<Room> },
    Deleted { code: RoomCode },
}

impl RoomEvent {
    pub fn snapshot(room: Room) -> Self {
        Self::Snapshot {
            room: Box::new(room),
        }
    }

    pub fn code(&self) -> &RoomCode {
        match self {
            Self::Snapshot { room } => room.code(),
            Self::Deleted { code } => code,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}

/// What a subscription yielded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionRecv {
    Event(RoomEvent),
    /// Some events were overwritten before being read
    Lagged(u64),
    /// The channel is gone
    Closed,
}

type Release = Box<dyn FnOnce() + Send + Sync>;

/// One observer's subscription to a room channel.
///
/// Dropping it unsubscribes and lets the publisher release the channel once
/// no observer is left. The receiver is dropped before the release hook runs.
pub struct RoomSubscription {
    code: RoomCode,
    receiver: Option<broadcast::Receiver<RoomEvent>>,
    release: Option<Release>,
}

impl RoomSubscription {
    pub fn new(
        code: RoomCode,
        receiver: broadcast::Receiver<RoomEvent>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            receiver: Some(receiver),
            release: Some(Box::new(release)),
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub async fn recv(&mut self) -> SubscriptionRecv {
        let Some(receiver) = self.receiver.as_mut() else {
            return SubscriptionRecv::Closed;
        };
        match receiver.recv().await {
            Ok(event) => SubscriptionRecv::Event(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => SubscriptionRecv::Lagged(skipped),
            Err(broadcast::error::RecvError::Closed) => SubscriptionRecv::Closed,
        }
    }
}

impl fmt::Debug for RoomSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomSubscription")
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        drop(self.receiver.take());
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomEventPublisher: Send + Sync {
    /// Publish on the event's room channel. Returns the number of local
    /// receivers reached (`0` when nobody is listening).
    async fn publish(&self, event: RoomEvent) -> Result<usize, PublishError>;

    async fn subscribe(&self, code: &RoomCode) -> Result<RoomSubscription, PublishError>;
}
