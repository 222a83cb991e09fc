//! Factories for generated identifiers and derived values.

use rand::Rng;
use uuid::Uuid;

use super::value_object::{DisplayName, MessageId, RoomCode};

/// Generates candidate room codes; uniqueness is checked by the store.
pub struct RoomCodeFactory;

impl RoomCodeFactory {
    pub fn generate() -> RoomCode {
        let value: u16 = rand::thread_rng().gen_range(1000..=9999);
        RoomCode::new(value.to_string()).expect("a number in 1000..=9999 is a valid room code")
    }
}

/// Generates message ids (UUID v4, simple form)
pub struct MessageIdFactory;

impl MessageIdFactory {
    pub fn generate() -> MessageId {
        MessageId::new(Uuid::new_v4().simple().to_string())
            .expect("a UUID is never empty")
    }
}

const AVATAR_BASE_URL: &str = "https://api.dicebear.com/8.x/bottts-neutral/svg";

/// Avatar URL derived deterministically from a display name.
pub fn default_avatar_url(name: &DisplayName) -> String {
    reqwest::Url::parse_with_params(AVATAR_BASE_URL, &[("seed", name.as_str())])
        .map(String::from)
        .unwrap_or_else(|_| AVATAR_BASE_URL.to_string())
}
