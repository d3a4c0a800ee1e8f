use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::new_id;

/// `Room` kinds per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Direct,
    Group,
    Channel,
    Thread,
}

/// `external_bindings: map[channel -> map[bridge_id -> external_id]]`.
///
/// Lookup must yield at most one room per `(channel, bridge_id,
/// external_id)` triple; that uniqueness is enforced by the Store's
/// secondary index, not by this type.
pub type ExternalBindings = HashMap<String, HashMap<String, String>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub external_bindings: ExternalBindings,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub inserted_at: DateTime<Utc>,
}

impl Room {
    pub fn new(room_type: RoomType, name: Option<String>) -> Self {
        Self {
            id: new_id("room"),
            room_type,
            name,
            external_bindings: HashMap::new(),
            metadata: serde_json::Value::Null,
            inserted_at: Utc::now(),
        }
    }

    /// Additive binding: never removes an existing `(channel, bridge_id)`
    /// mapping, only inserts or overwrites the external id for that pair.
    pub fn bind_external(&mut self, channel: &str, bridge_id: &str, external_id: &str) {
        self.external_bindings
            .entry(channel.to_string())
            .or_default()
            .insert(bridge_id.to_string(), external_id.to_string());
    }

    pub fn external_id_for(&self, channel: &str, bridge_id: &str) -> Option<&str> {
        self.external_bindings
            .get(channel)
            .and_then(|by_bridge| by_bridge.get(bridge_id))
            .map(String::as_str)
    }
}

/// Filters accepted by `ListRooms`.
#[derive(Debug, Clone, Default)]
pub struct RoomFilter {
    pub room_type: Option<RoomType>,
    pub name_contains: Option<String>,
}
