//! JSON frames exchanged with the Baileys sidecar over its WebSocket.
//!
//! Every frame is an object tagged by `type`. Frames about a session carry the
//! `session_id` the gateway chose when it asked the sidecar to connect, so
//! events from an abandoned socket can never leak into its replacement.

use std::path::PathBuf;

use {
    alya_bot::{
        UpsertKind,
        types::{ChatUpdate, MessageKey, ParticipantsUpdate, RawMessage},
    },
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Frames sent from the gateway to the sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    /// Open a socket with the given credential state.
    Connect {
        session_id: String,
        auth_dir: PathBuf,
        credentials: Value,
    },
    /// Close the socket without logging out.
    Disconnect { session_id: String },
    SendText {
        request_id: String,
        session_id: String,
        jid: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quoted: Option<RawMessage>,
    },
    ReadMessages {
        request_id: String,
        session_id: String,
        keys: Vec<MessageKey>,
    },
    GroupMetadata {
        request_id: String,
        session_id: String,
        jid: String,
    },
    DownloadMedia {
        request_id: String,
        session_id: String,
        message: RawMessage,
    },
    /// Answer to [`SidecarMessage::GetMessage`].
    MessageLookup { request_id: String, message: Value },
}

/// Connection phase reported by the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Close,
}

/// Frames sent from the sidecar to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    ConnectionUpdate {
        session_id: String,
        connection: ConnectionPhase,
        #[serde(default)]
        status_code: Option<u16>,
        #[serde(default)]
        reason: Option<String>,
        /// Own jid, present once open.
        #[serde(default)]
        user_id: Option<String>,
    },
    /// Pairing QR code; only emitted when no usable credentials exist.
    Qr { session_id: String, qr: String },
    CredsUpdate { session_id: String, creds: Value },
    ParticipantsUpdate {
        session_id: String,
        update: ParticipantsUpdate,
    },
    ChatsUpdate {
        session_id: String,
        chats: Vec<ChatUpdate>,
    },
    MessagesUpsert {
        session_id: String,
        upsert_type: UpsertKind,
        messages: Vec<RawMessage>,
    },
    /// The network asked for an old message body (retry receipts, quotes).
    GetMessage {
        request_id: String,
        session_id: String,
        id: String,
    },
    /// Result of a gateway request.
    Response {
        request_id: String,
        ok: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        #[serde(default)]
        session_id: Option<String>,
        error: String,
    },
}
