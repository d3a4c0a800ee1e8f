use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Status only ever advances forward through this order; callers that
    /// want to enforce monotonic advancement can use this rank.
    fn rank(self) -> u8 {
        match self {
            MessageStatus::Sending => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Read => 3,
            MessageStatus::Failed => 4,
        }
    }

    /// `Failed` is a terminal absorbing state reachable from anywhere;
    /// otherwise advancement must be strictly forward.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        next == MessageStatus::Failed || next.rank() > self.rank()
    }
}

/// One block of message content. Tagged the way the teacher's `WsMessage`
/// and `MessageContent` enums are tagged (`#[serde(tag = "type")]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { url: String, #[serde(default)] alt: Option<String> },
    Audio { url: String },
    Video { url: String },
    File { url: String, #[serde(default)] filename: Option<String> },
    ToolUse {
        tool_use_id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub status: MessageStatus,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub inserted_at: DateTime<Utc>,
}

impl Message {
    pub fn new(room_id: impl Into<String>, sender_id: impl Into<String>, role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: new_id("msg"),
            room_id: room_id.into(),
            sender_id: sender_id.into(),
            role,
            content,
            status: MessageStatus::Sending,
            external_id: None,
            reply_to_id: None,
            metadata: serde_json::Value::Null,
            inserted_at: Utc::now(),
        }
    }

    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Filters accepted by `ListMessages`.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub since: Option<DateTime<Utc>>,
    pub role: Option<Role>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_advances_monotonically() {
        assert!(MessageStatus::Sending.can_advance_to(MessageStatus::Sent));
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Delivered));
        assert!(!MessageStatus::Delivered.can_advance_to(MessageStatus::Sent));
        assert!(MessageStatus::Delivered.can_advance_to(MessageStatus::Failed));
    }

    #[test]
    fn text_content_joins_text_blocks_only() {
        let msg = Message::new(
            "room_1",
            "participant_1",
            Role::User,
            vec![
                ContentBlock::text("hello"),
                ContentBlock::Image {
                    url: "https://x/y.png".into(),
                    alt: None,
                },
                ContentBlock::text("world"),
            ],
        );
        assert_eq!(msg.text_content(), "hello\nworld");
    }
}
