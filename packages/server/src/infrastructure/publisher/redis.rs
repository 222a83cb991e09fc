//! Redis Pub/Sub fan-out for running several server processes on one store.
//!
//! `publish` sends the event JSON on `room:{code}:events`. Each process runs
//! one relay task that pattern-subscribes to every room channel and hands
//! what it receives to its local [`BroadcastRoomEvents`], which is where the
//! process's own observers subscribe.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use futures_util::StreamExt;
use redis::{AsyncCommands, RedisError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::broadcast::BroadcastRoomEvents;
use crate::domain::{PublishError, RoomCode, RoomEvent, RoomEventPublisher, RoomSubscription};

const CHANNEL_PATTERN: &str = "room:*:events";
const RELAY_BACKOFF_MIN: Duration = Duration::from_millis(250);
const RELAY_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Redis Pub/Sub を使った RoomEventPublisher 実装
pub struct RedisRoomEvents {
    client: redis::Client,
    pool: Pool,
    local: Arc<BroadcastRoomEvents>,
}

impl RedisRoomEvents {
    pub fn new(redis_url: &str, local: Arc<BroadcastRoomEvents>) -> Result<Self, PublishError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| PublishError::Broker(err.to_string()))?;
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| PublishError::Broker(err.to_string()))?;
        Ok(Self {
            client,
            pool,
            local,
        })
    }

    /// Start the relay task. It reconnects with backoff until `cancel` fires.
    pub fn spawn_relay(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let client = self.client.clone();
        let local = Arc::clone(&self.local);
        tokio::spawn(async move {
            let mut backoff = RELAY_BACKOFF_MIN;
            loop {
                let result = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = relay(&client, &local, &mut backoff) => result,
                };
                match result {
                    Ok(()) => tracing::warn!("Redis event stream ended, reconnecting"),
                    Err(err) => tracing::warn!("Redis event relay failed: {}", err),
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(RELAY_BACKOFF_MAX);
            }
            tracing::info!("Redis event relay stopped");
        })
    }
}

async fn relay(
    client: &redis::Client,
    local: &BroadcastRoomEvents,
    backoff: &mut Duration,
) -> Result<(), RedisError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(CHANNEL_PATTERN).await?;
    tracing::info!("Relaying Redis channels '{}'", CHANNEL_PATTERN);
    *backoff = RELAY_BACKOFF_MIN;

    let mut messages = pubsub.into_on_message();
    while let Some(message) = messages.next().await {
        let payload: String = match message.get_payload() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!("Unreadable payload on '{}': {}", message.get_channel_name(), err);
                continue;
            }
        };
        match serde_json::from_str::<RoomEvent>(&payload) {
            Ok(event) => {
                local.deliver(event);
            }
            Err(err) => tracing::warn!(
                "Undecodable event on '{}': {}",
                message.get_channel_name(),
                err
            ),
        }
    }
    Ok(())
}

#[async_trait]
impl RoomEventPublisher for RedisRoomEvents {
    /// Returns the number of relays (server processes) that received the event.
    async fn publish(&self, event: RoomEvent) -> Result<usize, PublishError> {
        let channel = event.code().channel_name();
        let payload =
            serde_json::to_string(&event).map_err(|err| PublishError::Encode(err.to_string()))?;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| PublishError::Broker(err.to_string()))?;
        let receivers: i64 = conn
            .publish(&channel, payload)
            .await
            .map_err(|err| PublishError::Broker(err.to_string()))?;
        Ok(usize::try_from(receivers).unwrap_or_default())
    }

    async fn subscribe(&self, code: &RoomCode) -> Result<RoomSubscription, PublishError> {
        Ok(self.local.open(code))
    }
}
