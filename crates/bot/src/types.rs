//! Wire-shaped records exchanged with the transport and the store.

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// The broadcast channel carrying contact status updates.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Identifies one message within a chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_jid: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Sender within a group chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

/// One inbound message exactly as the transport delivered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub key: MessageKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    /// Everything else (timestamps, status, receipts) kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Content type of a message, named after the protocol's content keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    Conversation,
    ExtendedText,
    Image,
    Sticker,
    Video,
    Audio,
    Document,
    Protocol,
    Reaction,
    Other(String),
}

impl MessageType {
    pub fn from_content_key(key: &str) -> Self {
        match key {
            "conversation" => Self::Conversation,
            "extendedTextMessage" => Self::ExtendedText,
            "imageMessage" => Self::Image,
            "stickerMessage" => Self::Sticker,
            "videoMessage" => Self::Video,
            "audioMessage" => Self::Audio,
            "documentMessage" => Self::Document,
            "protocolMessage" => Self::Protocol,
            "reactionMessage" => Self::Reaction,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Conversation => "conversation",
            Self::ExtendedText => "extendedTextMessage",
            Self::Image => "imageMessage",
            Self::Sticker => "stickerMessage",
            Self::Video => "videoMessage",
            Self::Audio => "audioMessage",
            Self::Document => "documentMessage",
            Self::Protocol => "protocolMessage",
            Self::Reaction => "reactionMessage",
            Self::Other(key) => key,
        }
    }

    /// Whether the content carries downloadable media.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            Self::Image | Self::Sticker | Self::Video | Self::Audio | Self::Document
        )
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat whose metadata changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatUpdate {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
    #[serde(other)]
    Unknown,
}

/// Members joined, left, or changed role in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantsUpdate {
    /// Group jid.
    pub id: String,
    pub participants: Vec<String>,
    pub action: ParticipantAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupParticipant {
    pub id: String,
    #[serde(default)]
    pub admin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub participants: Vec<GroupParticipant>,
}

/// Whether a jid addresses a group chat.
pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with("@g.us")
}

/// The user part of a jid: `15551234567:3@s.whatsapp.net` → `15551234567`.
pub fn jid_user(jid: &str) -> &str {
    let user = jid.split('@').next().unwrap_or(jid);
    user.split(':').next().unwrap_or(user)
}
