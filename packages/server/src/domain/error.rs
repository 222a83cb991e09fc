//! Domain layer errors.

use thiserror::Error;

/// Value object validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("room code must be exactly 4 digits, got '{0}'")]
    InvalidRoomCode(String),

    #[error("display name must not be empty")]
    EmptyDisplayName,

    #[error("display name is too long ({0} characters, max {max})", max = super::value_object::DisplayName::MAX_CHARS)]
    DisplayNameTooLong(usize),

    #[error("message id must not be empty")]
    EmptyMessageId,

    #[error("a message needs text or a file")]
    EmptyMessage,

    #[error("password hash is malformed")]
    MalformedPasswordHash,
}

/// Errors raised by a `RoomStore` backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("corrupt room record for '{code}': {reason}")]
    Corrupt { code: String, reason: String },
}

/// Errors raised while publishing to or subscribing on a room channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("failed to encode room event: {0}")]
    Encode(String),

    #[error("broker unavailable: {0}")]
    Broker(String),
}

/// Errors raised by the code classification collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(String),

    #[error("classifier returned an unreadable response: {0}")]
    Response(String),
}
