use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantType {
    Human,
    Agent,
    System,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(rename = "type")]
    pub participant_type: ParticipantType,
    #[serde(default)]
    pub identity: Identity,
    /// One participant per `(channel, external_id)`; this map is additive,
    /// same as `Room::external_bindings`.
    #[serde(default)]
    pub external_ids: HashMap<String, String>,
}

impl Participant {
    pub fn new(participant_type: ParticipantType, identity: Identity) -> Self {
        Self {
            id: new_id("participant"),
            participant_type,
            identity,
            external_ids: HashMap::new(),
        }
    }

    pub fn bind_external(&mut self, channel: &str, external_id: &str) {
        self.external_ids
            .insert(channel.to_string(), external_id.to_string());
    }

    pub fn external_id_for(&self, channel: &str) -> Option<&str> {
        self.external_ids.get(channel).map(String::as_str)
    }
}
