//! Domain layer: value objects, entities, room policy and the seams
//! (store, publisher, classifier) implemented by the infrastructure layer.

pub mod classifier;
pub mod entity;
pub mod error;
pub mod factory;
pub mod password;
pub mod policy;
pub mod publisher;
pub mod repository;
pub mod value_object;

pub use classifier::{Classification, CodeClassifier};
pub use entity::{Member, Message, MessageAuthor, MessageDetails, MessagePayload, Room, RoomMeta};
pub use error::{ClassifierError, PublishError, StoreError, ValueObjectError};
pub use factory::{MessageIdFactory, RoomCodeFactory, default_avatar_url};
pub use policy::RoomPolicy;
pub use publisher::{RoomEvent, RoomEventPublisher, RoomSubscription, SubscriptionRecv};
pub use repository::{AppendOutcome, JoinOutcome, RoomStore};
pub use value_object::{DisplayName, MessageId, PasswordHash, RoomCode, Timestamp};
