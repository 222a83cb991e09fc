//! InMemory room store.
//!
//! All rooms live in one `HashMap` behind a `tokio::sync::Mutex`; every
//! primitive runs entirely under the lock, which gives the per-room atomicity
//! the `RoomStore` contract asks for. Records carry their own expiry and are
//! purged on access once it has passed, the same way a TTL key would vanish.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use roomcast_shared::time::Clock;
use tokio::sync::Mutex;

use crate::domain::{
    AppendOutcome, DisplayName, JoinOutcome, Member, Message, MessageDetails, MessageId, Room,
    RoomCode, RoomMeta, RoomStore, StoreError, Timestamp,
};

struct StoredRoom {
    meta: RoomMeta,
    messages: VecDeque<Message>,
    members: HashMap<DisplayName, Member>,
    typing: HashMap<DisplayName, Timestamp>,
    kicked: HashSet<DisplayName>,
    /// Store-side TTL deadline
    evict_at: Timestamp,
}

impl StoredRoom {
    fn to_room(&self) -> Room {
        Room {
            meta: self.meta.clone(),
            messages: self.messages.iter().cloned().collect(),
            members: self.members.values().cloned().collect(),
            typing: self
                .typing
                .iter()
                .map(|(name, at)| (name.clone(), *at))
                .collect(),
            kicked: self.kicked.iter().cloned().collect(),
        }
    }

    fn touch_member(&mut self, name: &DisplayName, at: Timestamp) {
        if let Some(member) = self.members.get_mut(name) {
            member.joined_at = at;
        }
    }
}

/// インメモリ Room Store 実装
pub struct InMemoryRoomStore {
    rooms: Mutex<HashMap<RoomCode, StoredRoom>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRoomStore {
    /// 新しい InMemoryRoomStore を作成
    ///
    /// `clock` drives the store-side TTL.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }
}

/// Look up a room, purging it first if its TTL has passed.
fn live<'a>(
    rooms: &'a mut HashMap<RoomCode, StoredRoom>,
    code: &RoomCode,
    now: Timestamp,
) -> Option<&'a mut StoredRoom> {
    if rooms.get(code).is_some_and(|room| now > room.evict_at) {
        rooms.remove(code);
        tracing::debug!("Store TTL elapsed for room '{}'", code);
    }
    rooms.get_mut(code)
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn create_room(&self, meta: &RoomMeta, ttl: Duration) -> Result<bool, StoreError> {
        let now = self.now();
        let mut rooms = self.rooms.lock().await;
        if live(&mut rooms, &meta.code, now).is_some() {
            return Ok(false);
        }
        rooms.insert(
            meta.code.clone(),
            StoredRoom {
                meta: meta.clone(),
                messages: VecDeque::new(),
                members: HashMap::new(),
                typing: HashMap::new(),
                kicked: HashSet::new(),
                evict_at: now.plus_millis(ttl_millis(ttl)),
            },
        );
        Ok(true)
    }

    async fn load_room(&self, code: &RoomCode) -> Result<Option<Room>, StoreError> {
        let now = self.now();
        let mut rooms = self.rooms.lock().await;
        Ok(live(&mut rooms, code, now).map(|room| room.to_room()))
    }

    async fn load_meta(&self, code: &RoomCode) -> Result<Option<RoomMeta>, StoreError> {
        let now = self.now();
        let mut rooms = self.rooms.lock().await;
        Ok(live(&mut rooms, code, now).map(|room| room.meta.clone()))
    }

    async fn append_message(
        &self,
        code: &RoomCode,
        message: &Message,
        max_messages: usize,
    ) -> Result<AppendOutcome, StoreError> {
        let now = self.now();
        let mut rooms = self.rooms.lock().await;
        let Some(room) = live(&mut rooms, code, now) else {
            return Ok(AppendOutcome::RoomMissing);
        };
        let sender = &message.user.name;
        if room.kicked.contains(sender) {
            return Ok(AppendOutcome::SenderKicked);
        }

        room.messages.push_back(message.clone());
        while room.messages.len() > max_messages {
            room.messages.pop_front();
        }
        room.typing.remove(sender);
        room.touch_member(sender, message.timestamp);
        Ok(AppendOutcome::Appended)
    }

    async fn update_message_details(
        &self,
        code: &RoomCode,
        message_id: &MessageId,
        details: &MessageDetails,
    ) -> Result<bool, StoreError> {
        let now = self.now();
        let mut rooms = self.rooms.lock().await;
        let Some(room) = live(&mut rooms, code, now) else {
            return Ok(false);
        };
        match room.messages.iter_mut().find(|m| &m.id == message_id) {
            Some(message) => {
                message.apply_details(details);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_typing(
        &self,
        code: &RoomCode,
        name: &DisplayName,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let now = self.now();
        let mut rooms = self.rooms.lock().await;
        let Some(room) = live(&mut rooms, code, now) else {
            return Ok(false);
        };
        room.typing.insert(name.clone(), at);
        room.touch_member(name, at);
        Ok(true)
    }

    async fn join_member(
        &self,
        code: &RoomCode,
        member: &Member,
    ) -> Result<JoinOutcome, StoreError> {
        let now = self.now();
        let mut rooms = self.rooms.lock().await;
        let Some(room) = live(&mut rooms, code, now) else {
            return Ok(JoinOutcome::RoomMissing);
        };
        if room.kicked.contains(&member.name) {
            return Ok(JoinOutcome::Kicked);
        }

        let became_admin = room.meta.admin.is_none();
        if became_admin {
            room.meta.admin = Some(member.name.clone());
        }
        match room.members.get_mut(&member.name) {
            Some(existing) => {
                existing.joined_at = member.joined_at;
                Ok(JoinOutcome::Refreshed { became_admin })
            }
            None => {
                room.members.insert(member.name.clone(), member.clone());
                Ok(JoinOutcome::Joined { became_admin })
            }
        }
    }

    async fn remove_member(
        &self,
        code: &RoomCode,
        name: &DisplayName,
    ) -> Result<bool, StoreError> {
        let now = self.now();
        let mut rooms = self.rooms.lock().await;
        let Some(room) = live(&mut rooms, code, now) else {
            return Ok(false);
        };
        room.members.remove(name);
        room.typing.remove(name);
        Ok(true)
    }

    async fn kick_member(&self, code: &RoomCode, name: &DisplayName) -> Result<bool, StoreError> {
        let now = self.now();
        let mut rooms = self.rooms.lock().await;
        let Some(room) = live(&mut rooms, code, now) else {
            return Ok(false);
        };
        room.kicked.insert(name.clone());
        room.members.remove(name);
        room.typing.remove(name);
        Ok(true)
    }

    async fn set_pinned(
        &self,
        code: &RoomCode,
        message_id: Option<MessageId>,
    ) -> Result<bool, StoreError> {
        let now = self.now();
        let mut rooms = self.rooms.lock().await;
        let Some(room) = live(&mut rooms, code, now) else {
            return Ok(false);
        };
        room.meta.pinned_message_id = message_id;
        Ok(true)
    }

    async fn delete_room(&self, code: &RoomCode) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        rooms.remove(code);
        Ok(())
    }

    async fn delete_room_if_created_at(
        &self,
        code: &RoomCode,
        created_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut rooms = self.rooms.lock().await;
        if rooms
            .get(code)
            .is_some_and(|room| room.meta.created_at == created_at)
        {
            rooms.remove(code);
            return Ok(true);
        }
        Ok(false)
    }

    async fn room_codes(&self) -> Result<Vec<RoomCode>, StoreError> {
        let rooms = self.rooms.lock().await;
        Ok(rooms.keys().cloned().collect())
    }
}
