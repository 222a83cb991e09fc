//! UseCase layer errors.

use thiserror::Error;

use crate::domain::{PublishError, StoreError, ValueObjectError};

/// Error kinds every room operation can return.
///
/// Each kind maps to a distinct client reaction, so they are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// The room does not exist or has expired
    #[error("room not found")]
    NotFound,

    /// The actor lacks the privilege for this operation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed input, rejected before any store call
    #[error("invalid request: {0}")]
    Validation(String),

    /// The store is unreachable or timed out; effects were not applied
    #[error("store temporarily unavailable: {0}")]
    TransientStore(String),
}

impl From<ValueObjectError> for RoomError {
    fn from(err: ValueObjectError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StoreError> for RoomError {
    fn from(err: StoreError) -> Self {
        if let StoreError::Corrupt { .. } = &err {
            tracing::error!("{}", err);
        }
        Self::TransientStore(err.to_string())
    }
}

impl From<PublishError> for RoomError {
    fn from(err: PublishError) -> Self {
        Self::TransientStore(err.to_string())
    }
}
