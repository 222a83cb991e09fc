//! Shared test fixture for the use case tests: an in-memory store and a
//! local broadcast publisher sharing one manual clock with the use cases.

use std::sync::Arc;

use roomcast_shared::time::ManualClock;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{DisplayName, Room, RoomCode, RoomMeta, RoomPolicy, RoomStore},
    infrastructure::{publisher::BroadcastRoomEvents, repository::InMemoryRoomStore},
};

use super::{
    lifecycle::RoomLifecycle, membership::MembershipUseCase, send_message::SendMessageUseCase,
    typing::TypingUseCase, watch_room::RoomWatch, watch_room::WatchRoomUseCase,
};

const START_MILLIS: i64 = 1_700_000_000_000;

pub(crate) fn name(value: &str) -> DisplayName {
    DisplayName::new(value.to_string()).unwrap()
}

pub(crate) struct Fixture {
    /// Clock of the use cases
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryRoomStore>,
    pub events: Arc<BroadcastRoomEvents>,
    pub lifecycle: Arc<RoomLifecycle>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_policy(RoomPolicy::default())
    }

    pub fn with_policy(policy: RoomPolicy) -> Self {
        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let store = Arc::new(InMemoryRoomStore::new(clock.clone()));
        Self::build(clock, store, policy)
    }

    fn build(clock: Arc<ManualClock>, store: Arc<InMemoryRoomStore>, policy: RoomPolicy) -> Self {
        let events = Arc::new(BroadcastRoomEvents::default());
        let lifecycle = Arc::new(RoomLifecycle::new(
            store.clone(),
            events.clone(),
            clock.clone(),
            policy,
        ));
        Self {
            clock,
            store,
            events,
            lifecycle,
        }
    }

    pub fn membership(&self) -> MembershipUseCase {
        MembershipUseCase::new(self.lifecycle.clone())
    }

    pub fn send_message(&self) -> SendMessageUseCase {
        SendMessageUseCase::new(self.lifecycle.clone(), None)
    }

    pub fn typing(&self) -> TypingUseCase {
        TypingUseCase::new(self.lifecycle.clone())
    }

    pub async fn watch(&self, code: &RoomCode) -> RoomWatch {
        WatchRoomUseCase::new(self.lifecycle.clone())
            .watch(code, CancellationToken::new())
            .await
            .unwrap()
    }

    /// A public room whose admin is `admin`.
    pub async fn public_room_with_admin(&self, admin: &str) -> RoomCode {
        let code = self.lifecycle.create_room(false, None).await.unwrap();
        self.membership().join(&code, name(admin), None).await.unwrap();
        code
    }

    pub async fn room(&self, code: &RoomCode) -> Room {
        self.lifecycle.get_room(code).await.unwrap().unwrap()
    }

    /// Raw metadata as stored, bypassing the expiry gate.
    pub async fn stored_meta(&self, code: &RoomCode) -> Option<RoomMeta> {
        self.store.load_meta(code).await.unwrap()
    }

    /// Remove a room without announcing it.
    pub async fn delete_silently(&self, code: &RoomCode) {
        self.store.delete_room(code).await.unwrap();
    }
}
