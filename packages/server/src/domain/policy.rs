//! Room policy: the fixed limits every room is governed by.

use std::time::Duration;

/// Limits and deadlines applied to every room.
///
/// Built once at startup from configuration and handed to each component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPolicy {
    /// Lifetime of a room, counted from creation
    pub ttl: Duration,
    /// How long the store keeps a room past `ttl`. Within this margin the
    /// lifecycle deletes it and announces the deletion.
    pub eviction_grace: Duration,
    /// Maximum number of retained messages (oldest evicted first)
    pub max_messages: usize,
    /// Typing indicators older than this are excluded from snapshots
    pub typing_timeout: Duration,
    /// Members silent for longer than this are excluded from snapshots
    pub member_inactive_timeout: Option<Duration>,
    /// Deadline for a single store call
    pub store_timeout: Duration,
    /// A subscription silent for this long re-reads the room
    pub liveness_timeout: Duration,
    /// Attempts at finding an unused room code before giving up
    pub code_attempts: usize,
    /// Minimum password length for private rooms
    pub min_password_len: usize,
}

impl RoomPolicy {
    pub fn ttl_millis(&self) -> i64 {
        duration_millis(self.ttl)
    }

    /// TTL handed to the store
    pub fn store_ttl(&self) -> Duration {
        self.ttl.saturating_add(self.eviction_grace)
    }

    pub fn typing_timeout_millis(&self) -> i64 {
        duration_millis(self.typing_timeout)
    }

    pub fn member_inactive_timeout_millis(&self) -> Option<i64> {
        self.member_inactive_timeout.map(duration_millis)
    }
}

impl Default for RoomPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(2 * 60 * 60),
            eviction_grace: Duration::from_secs(10 * 60),
            max_messages: 100,
            typing_timeout: Duration::from_secs(3),
            member_inactive_timeout: Some(Duration::from_secs(5 * 60)),
            store_timeout: Duration::from_secs(2),
            liveness_timeout: Duration::from_secs(25),
            code_attempts: 32,
            min_password_len: 4,
        }
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
