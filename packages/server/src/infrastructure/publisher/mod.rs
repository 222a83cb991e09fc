//! ルームイベント配信（fan-out）の実装
//!
//! ## 実装
//!
//! - `broadcast`: プロセス内の `tokio::sync::broadcast` チャネル
//! - `redis`: Redis Pub/Sub 経由で複数プロセスに配信し、各プロセスでは
//!   `broadcast` に中継する

pub mod broadcast;
pub mod redis;

pub use broadcast::BroadcastRoomEvents;
pub use redis::RedisRoomEvents;
