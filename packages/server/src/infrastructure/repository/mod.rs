//! `RoomStore` implementations.
//!
//! - `inmemory`: single-process store, the default and the one tests use
//! - `redis`: shared store for several server processes

pub mod inmemory;
pub mod redis;

pub use inmemory::InMemoryRoomStore;
pub use redis::RedisRoomStore;
