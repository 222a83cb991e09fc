//! UseCase layer: room operations built on the domain seams.
//!
//! `RoomLifecycle` owns the gates every operation goes through (store
//! deadline, expiry check, snapshot publish); the other use cases are thin
//! compositions of a store primitive and those gates.

pub mod classification;
pub mod error;
pub mod lifecycle;
pub mod membership;
pub mod pin_message;
pub mod send_message;
pub mod typing;
pub mod update_message_details;
pub mod watch_room;

#[cfg(test)]
pub(crate) mod test_support;

pub use classification::{ClassificationQueue, fenced_code};
pub use error::RoomError;
pub use lifecycle::RoomLifecycle;
pub use membership::MembershipUseCase;
pub use pin_message::PinMessageUseCase;
pub use send_message::SendMessageUseCase;
pub use typing::TypingUseCase;
pub use update_message_details::UpdateMessageDetailsUseCase;
pub use watch_room::{RoomWatch, WatchRoomUseCase};
