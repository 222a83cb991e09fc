//! Events pushed to room observers (SSE and WebSocket).

use serde::{Deserialize, Serialize};

use super::http::RoomSnapshotDto;

/// One event on a room stream, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoomEventDto {
    Snapshot { room: RoomSnapshotDto },
    Deleted { code: String },
}

impl RoomEventDto {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::Deleted { .. } => "deleted",
        }
    }
}
