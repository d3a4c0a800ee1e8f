use serde::{Deserialize, Serialize};

/// Capabilities an adapter may advertise (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Text,
    Image,
    Audio,
    Video,
    File,
    Reactions,
    Threads,
    Streaming,
    MessageEdit,
}
