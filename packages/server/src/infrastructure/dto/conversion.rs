//! Conversion logic from domain entities to DTOs.

use crate::domain::{Member, Message, Room, RoomEvent};

use super::{
    http::{MemberDto, MessageDto, MessageUserDto, RoomSnapshotDto},
    stream::RoomEventDto,
};

// ========================================
// Domain Entity → DTO
// ========================================

impl From<Message> for MessageDto {
    fn from(model: Message) -> Self {
        Self {
            id: model.id.into_string(),
            text: model.text,
            user: MessageUserDto {
                name: model.user.name.into_string(),
                avatar_url: model.user.avatar_url,
            },
            timestamp: model.timestamp.value(),
            file_url: model.file_url,
            file_name: model.file_name,
            file_type: model.file_type,
            language: model.language,
            explanation: model.explanation,
        }
    }
}

impl From<Member> for MemberDto {
    fn from(model: Member) -> Self {
        Self {
            name: model.name.into_string(),
            avatar_url: model.avatar_url,
            joined_at: model.joined_at.value(),
        }
    }
}

impl From<Room> for RoomSnapshotDto {
    fn from(model: Room) -> Self {
        let Room {
            meta,
            messages,
            members,
            typing,
            kicked: _,
        } = model;
        Self {
            code: meta.code.into_string(),
            created_at: meta.created_at.value(),
            expires_at: meta.expires_at.value(),
            is_private: meta.is_private,
            admin: meta.admin.map(|admin| admin.into_string()),
            pinned_message_id: meta.pinned_message_id.map(|id| id.into_string()),
            messages: messages.into_iter().map(MessageDto::from).collect(),
            users: members.into_iter().map(MemberDto::from).collect(),
            typing: typing
                .into_iter()
                .map(|(name, at)| (name.into_string(), at.value()))
                .collect(),
        }
    }
}

impl From<RoomEvent> for RoomEventDto {
    fn from(event: RoomEvent) -> Self {
        match event {
            RoomEvent::Snapshot { room } => Self::Snapshot {
                room: RoomSnapshotDto::from(*room),
            },
            RoomEvent::Deleted { code } => Self::Deleted {
                code: code.into_string(),
            },
        }
    }
}
