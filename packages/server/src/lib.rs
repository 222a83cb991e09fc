//! Ephemeral chat room server library.
//!
//! Rooms are short-lived, TTL-bound aggregates identified by a 4-digit code.
//! Every mutation goes through atomic store primitives and is followed by a
//! full-snapshot publish on the room's broadcast channel.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
