//! Data Transfer Objects (DTOs) for the room service.
//!
//! DTOs are organized by protocol:
//! - `http`: HTTP API request and response bodies
//! - `stream`: events pushed over SSE and WebSocket

pub mod conversion;
pub mod http;
pub mod stream;
