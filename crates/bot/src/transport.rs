//! The transport seam: whatever actually speaks to the chat network.
//!
//! A [`Transport`] opens sessions; each open session is a [`SessionHandle`]
//! plus a stream of [`SessionEvent`]s. The core never looks behind either.

use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tokio::sync::mpsc,
};

use crate::{
    store::MessageStore,
    types::{ChatUpdate, GroupMetadata, MessageKey, ParticipantsUpdate, RawMessage},
};

/// Close status the network uses when the device was logged out remotely.
pub const LOGGED_OUT_STATUS: u16 = 401;

/// Why a session closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReason {
    pub status_code: Option<u16>,
    pub message: Option<String>,
}

impl CloseReason {
    pub fn new(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: Some(message.into()),
        }
    }

    pub fn is_logged_out(&self) -> bool {
        self.status_code == Some(LOGGED_OUT_STATUS)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.status_code, &self.message) {
            (Some(code), Some(msg)) => write!(f, "{msg} (status {code})"),
            (Some(code), None) => write!(f, "status {code}"),
            (None, Some(msg)) => f.write_str(msg),
            (None, None) => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUpdate {
    Connecting,
    Open,
    Close(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    /// Live messages that just arrived.
    Notify,
    /// History sync or replays.
    Append,
    #[serde(other)]
    Other,
}

/// A batch of messages delivered together.
#[derive(Debug, Clone, PartialEq)]
pub struct MessagesUpsert {
    pub kind: UpsertKind,
    pub messages: Vec<RawMessage>,
}

/// Everything a session can report.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connection(ConnectionUpdate),
    /// Full credential blob to persist as-is.
    CredentialsUpdate(Value),
    Participants(ParticipantsUpdate),
    ChatsUpdate(Vec<ChatUpdate>),
    MessagesUpsert(MessagesUpsert),
}

/// Operations available on a live session.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// The account's own jid, known once the session is open.
    fn user_id(&self) -> Option<String>;

    /// Send a text message, optionally quoting another message.
    async fn send_text(&self, jid: &str, text: &str, quoted: Option<&RawMessage>) -> Result<()>;

    /// Send read receipts.
    async fn read_messages(&self, keys: &[MessageKey]) -> Result<()>;

    async fn group_metadata(&self, jid: &str) -> Result<GroupMetadata>;

    /// Download and decrypt the media attached to a message.
    async fn download_media(&self, message: &RawMessage) -> Result<Vec<u8>>;

    /// Release the underlying connection. No-op by default.
    async fn close(&self) {}
}

/// What a transport needs to open a session.
#[derive(Clone)]
pub struct ConnectOptions {
    /// Credential state loaded from the session store (`Null` when unpaired).
    pub credentials: Value,
    /// Resolves old message bodies the network asks for again.
    pub store: Arc<dyn MessageStore>,
}

/// A freshly opened session.
pub struct Connection {
    pub handle: Arc<dyn SessionHandle>,
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Opens sessions against the chat network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, options: ConnectOptions) -> Result<Connection>;
}
