//! Request handlers, grouped by protocol.

mod http;
mod stream;
mod websocket;

pub use http::{
    create_room, delete_room, get_room, health_check, join_room, kick_user, leave_room,
    pin_message, send_message, typing, verify_password,
};
pub use stream::room_events;
pub use websocket::websocket_handler;

use crate::{domain::RoomCode, usecase::RoomError};

/// A path segment that is not a well-formed code cannot name a room.
fn parse_code(raw: String) -> Result<RoomCode, RoomError> {
    RoomCode::new(raw).map_err(|_| RoomError::NotFound)
}
