use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::{
    transport::SessionHandle,
    types::{ChatUpdate, ParticipantsUpdate, RawMessage},
};

/// Persistence for messages, chats and display names.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn load_message(&self, id: &str) -> Result<Option<RawMessage>>;
    async fn save_message(&self, message: &RawMessage, sender: &str) -> Result<()>;
    async fn save_chat(&self, chat: &ChatUpdate) -> Result<()>;
    /// Last known display name of a sender.
    async fn get_name(&self, sender: &str) -> Result<Option<String>>;
}

/// A chat muted from command dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausedChatEntry {
    pub chat_id: String,
    pub reason: Option<String>,
    /// Unix seconds.
    pub paused_at: i64,
}

/// Registry of paused chats. The core only reads it; commands write it.
#[async_trait]
pub trait PausedChats: Send + Sync {
    async fn paused_chats(&self) -> Result<Vec<PausedChatEntry>>;
    async fn pause(&self, chat_id: &str, reason: Option<&str>) -> Result<()>;
    /// Returns whether the chat was paused.
    async fn resume(&self, chat_id: &str) -> Result<bool>;
}

/// Reacts to group membership changes.
#[async_trait]
pub trait Greeter: Send + Sync {
    async fn greet(&self, update: &ParticipantsUpdate, session: Arc<dyn SessionHandle>)
    -> Result<()>;
}
