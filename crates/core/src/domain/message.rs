use serde::{Deserialize, Serialize};

/// Canonical inbound record handed to the bus, one per accepted platform
/// message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform message id. For Slack this is the message `ts`.
    pub id: String,
    pub chat_jid: String,
    pub sender: String,
    pub sender_name: String,
    pub content: String,
    /// ISO-8601 UTC, millisecond precision.
    pub timestamp: String,
    pub is_from_me: bool,
    pub is_bot_message: bool,
    /// Anchor of the thread a reply should land in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMetadata {
    pub jid: String,
    pub timestamp: String,
    pub name: Option<String>,
    pub channel: String,
    pub is_group: bool,
}
