//! Domain entities: room metadata, messages, members and the room snapshot.
//!
//! The same types are persisted by the store backends and carried on the
//! broadcast channel, so they are serde-enabled here. HTTP DTOs live in the
//! infrastructure layer.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{
    error::ValueObjectError,
    policy::RoomPolicy,
    value_object::{DisplayName, MessageId, PasswordHash, RoomCode, Timestamp},
};

/// Room metadata record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMeta {
    pub code: RoomCode,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub is_private: bool,
    pub password_hash: Option<PasswordHash>,
    pub admin: Option<DisplayName>,
    pub pinned_message_id: Option<MessageId>,
}

impl RoomMeta {
    pub fn new(
        code: RoomCode,
        created_at: Timestamp,
        ttl_millis: i64,
        is_private: bool,
        password_hash: Option<PasswordHash>,
    ) -> Self {
        Self {
            code,
            created_at,
            expires_at: created_at.plus_millis(ttl_millis),
            is_private,
            password_hash,
            admin: None,
            pinned_message_id: None,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    pub fn is_admin(&self, name: &DisplayName) -> bool {
        self.admin.as_ref() == Some(name)
    }
}

/// Snapshot of the sender taken at send time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAuthor {
    pub name: DisplayName,
    pub avatar_url: String,
}

/// File attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub url: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
}

/// Validated content of a message about to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePayload {
    text: String,
    file: Option<FileAttachment>,
}

impl MessagePayload {
    /// Build a payload; at least one of text or file must be present.
    pub fn new(
        text: Option<String>,
        file: Option<FileAttachment>,
    ) -> Result<Self, ValueObjectError> {
        let text = text.unwrap_or_default();
        let file = file.filter(|file| !file.url.trim().is_empty());
        if text.trim().is_empty() && file.is_none() {
            return Err(ValueObjectError::EmptyMessage);
        }
        Ok(Self { text, file })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn file(&self) -> Option<&FileAttachment> {
        self.file.as_ref()
    }
}

/// Post-hoc details filled in by the code classifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDetails {
    pub language: Option<String>,
    pub explanation: Option<String>,
}

impl MessageDetails {
    pub fn is_empty(&self) -> bool {
        self.language.is_none() && self.explanation.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub user: MessageAuthor,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Message {
    pub fn new(
        id: MessageId,
        user: MessageAuthor,
        payload: MessagePayload,
        timestamp: Timestamp,
    ) -> Self {
        let MessagePayload { text, file } = payload;
        let (file_url, file_name, file_type) = match file {
            Some(file) => (Some(file.url), file.name, file.mime_type),
            None => (None, None, None),
        };
        Self {
            id,
            text,
            user,
            timestamp,
            file_url,
            file_name,
            file_type,
            language: None,
            explanation: None,
        }
    }

    /// Merge classifier details; fields absent from `details` are left as-is.
    pub fn apply_details(&mut self, details: &MessageDetails) {
        if let Some(language) = &details.language {
            self.language = Some(language.clone());
        }
        if let Some(explanation) = &details.explanation {
            self.explanation = Some(explanation.clone());
        }
    }
}

/// Membership of one display name in one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub name: DisplayName,
    pub avatar_url: String,
    /// Join time, refreshed on any activity
    pub joined_at: Timestamp,
}

/// Full room aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub meta: RoomMeta,
    /// Oldest first
    pub messages: Vec<Message>,
    pub members: Vec<Member>,
    pub typing: BTreeMap<DisplayName, Timestamp>,
    pub kicked: BTreeSet<DisplayName>,
}

impl Room {
    pub fn new(meta: RoomMeta) -> Self {
        Self {
            meta,
            messages: Vec::new(),
            members: Vec::new(),
            typing: BTreeMap::new(),
            kicked: BTreeSet::new(),
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.meta.code
    }

    /// Drop everything a client must not see as current at `now`:
    /// stale typing entries, inactive members, and messages beyond the cap.
    /// Members come out ordered by join time.
    pub fn prune(mut self, now: Timestamp, policy: &RoomPolicy) -> Self {
        let typing_timeout = policy.typing_timeout_millis();
        self.typing
            .retain(|_, typed_at| typed_at.elapsed_until(now) <= typing_timeout);

        if let Some(inactive) = policy.member_inactive_timeout_millis() {
            self.members
                .retain(|member| member.joined_at.elapsed_until(now) < inactive);
        }
        self.members
            .sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.name.cmp(&b.name)));

        if self.messages.len() > policy.max_messages {
            let excess = self.messages.len() - policy.max_messages;
            self.messages.drain(..excess);
        }
        self
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| &message.id == id)
    }

    pub fn pinned_message(&self) -> Option<&Message> {
        self.meta
            .pinned_message_id
            .as_ref()
            .and_then(|id| self.message(id))
    }

    pub fn member(&self, name: &DisplayName) -> Option<&Member> {
        self.members.iter().find(|member| &member.name == name)
    }

    pub fn is_kicked(&self, name: &DisplayName) -> bool {
        self.kicked.contains(name)
    }
}
