use serde::{Deserialize, Serialize};

use crate::ids::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Both,
    Inbound,
    Outbound,
}

impl Direction {
    pub fn allows_outbound(self) -> bool {
        matches!(self, Direction::Both | Direction::Outbound)
    }

    pub fn allows_inbound(self) -> bool {
        matches!(self, Direction::Both | Direction::Inbound)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomBinding {
    pub id: String,
    pub room_id: String,
    pub channel: String,
    pub bridge_id: String,
    pub external_room_id: String,
    pub direction: Direction,
    pub enabled: bool,
    #[serde(default)]
    pub priority: Option<i32>,
    pub revision: u64,
}

impl RoomBinding {
    pub fn new(
        room_id: impl Into<String>,
        channel: impl Into<String>,
        bridge_id: impl Into<String>,
        external_room_id: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            id: new_id("binding"),
            room_id: room_id.into(),
            channel: channel.into(),
            bridge_id: bridge_id.into(),
            external_room_id: external_room_id.into(),
            direction,
            enabled: true,
            priority: None,
            revision: 0,
        }
    }

    /// `(channel, bridge_id, external_room_id)` — the unique external key.
    pub fn external_key(&self) -> String {
        format!("{}:{}:{}", self.channel, self.bridge_id, self.external_room_id)
    }
}
