//! Room store trait.
//!
//! The domain defines the store primitives it needs; the infrastructure layer
//! provides the backends (in-memory, Redis).
//!
//! Every primitive is atomic with respect to every other primitive on the
//! same room, and every write is conditional on the room's metadata record
//! still existing: no call may resurrect a deleted or expired room.

use std::time::Duration;

use async_trait::async_trait;

use super::{
    entity::{Member, Message, MessageDetails, Room, RoomMeta},
    error::StoreError,
    value_object::{DisplayName, MessageId, RoomCode, Timestamp},
};

/// Result of appending a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    RoomMissing,
    SenderKicked,
}

/// Result of a join attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// New membership created
    Joined { became_admin: bool },
    /// Membership already existed; liveness refreshed
    Refreshed { became_admin: bool },
    /// Name is on the kicked set; nothing changed
    Kicked,
    RoomMissing,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Create the room if the code is free. Leftover auxiliary collections
    /// under the same code are purged in the same step.
    async fn create_room(&self, meta: &RoomMeta, ttl: Duration) -> Result<bool, StoreError>;

    /// Consistent read of the whole aggregate, unfiltered.
    async fn load_room(&self, code: &RoomCode) -> Result<Option<Room>, StoreError>;

    async fn load_meta(&self, code: &RoomCode) -> Result<Option<RoomMeta>, StoreError>;

    /// Kicked check, push, trim to `max_messages`, clear the sender's typing
    /// entry and refresh the sender's liveness, as one step.
    async fn append_message(
        &self,
        code: &RoomCode,
        message: &Message,
        max_messages: usize,
    ) -> Result<AppendOutcome, StoreError>;

    /// Merge details into a retained message. `false` if the room or the
    /// message is gone.
    async fn update_message_details(
        &self,
        code: &RoomCode,
        message_id: &MessageId,
        details: &MessageDetails,
    ) -> Result<bool, StoreError>;

    /// Record a typing ping and refresh liveness. `false` if the room is gone.
    async fn set_typing(
        &self,
        code: &RoomCode,
        name: &DisplayName,
        at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Kicked check, upsert membership and set-admin-if-absent, as one step.
    async fn join_member(&self, code: &RoomCode, member: &Member)
    -> Result<JoinOutcome, StoreError>;

    /// Remove membership and typing entry. `false` if the room is gone.
    async fn remove_member(&self, code: &RoomCode, name: &DisplayName)
    -> Result<bool, StoreError>;

    /// Add to the kicked set and remove membership. `false` if the room is gone.
    async fn kick_member(&self, code: &RoomCode, name: &DisplayName) -> Result<bool, StoreError>;

    /// Set or clear the pinned message. `false` if the room is gone.
    async fn set_pinned(
        &self,
        code: &RoomCode,
        message_id: Option<MessageId>,
    ) -> Result<bool, StoreError>;

    /// Remove every collection of the room in one step.
    async fn delete_room(&self, code: &RoomCode) -> Result<(), StoreError>;

    /// Delete only if the stored room is the instance created at `created_at`.
    async fn delete_room_if_created_at(
        &self,
        code: &RoomCode,
        created_at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Codes of all stored rooms
    async fn room_codes(&self) -> Result<Vec<RoomCode>, StoreError>;
}
