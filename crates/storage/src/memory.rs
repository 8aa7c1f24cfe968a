//! In-memory store. No persistence.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    alya_bot::{
        MessageStore, PausedChatEntry, PausedChats,
        types::{ChatUpdate, RawMessage},
    },
    anyhow::{Result, bail},
    async_trait::async_trait,
    serde_json::{Map, Value},
};

struct StoredMessage {
    raw: RawMessage,
    sender: String,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    messages: HashMap<String, StoredMessage>,
    chats: HashMap<String, Map<String, Value>>,
    paused: HashMap<String, PausedChatEntry>,
    seq: u64,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn load_message(&self, id: &str) -> Result<Option<RawMessage>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.messages.get(id).map(|m| m.raw.clone()))
    }

    async fn save_message(&self, message: &RawMessage, sender: &str) -> Result<()> {
        let Some(id) = message.key.id.clone() else {
            bail!("message has no id");
        };
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.seq += 1;
        let seq = inner.seq;
        inner.messages.insert(id, StoredMessage {
            raw: message.clone(),
            sender: sender.to_string(),
            seq,
        });
        Ok(())
    }

    async fn save_chat(&self, chat: &ChatUpdate) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = inner.chats.entry(chat.id.clone()).or_default();
        for (key, value) in &chat.fields {
            entry.insert(key.clone(), value.clone());
        }
        entry.insert("id".into(), Value::String(chat.id.clone()));
        Ok(())
    }

    async fn get_name(&self, sender: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .messages
            .values()
            .filter(|m| m.sender == sender)
            .filter_map(|m| {
                m.raw
                    .push_name
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .map(|n| (m.seq, n))
            })
            .max_by_key(|(seq, _)| *seq)
            .map(|(_, name)| name.to_string()))
    }
}

#[async_trait]
impl PausedChats for InMemoryStore {
    async fn paused_chats(&self) -> Result<Vec<PausedChatEntry>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<_> = inner.paused.values().cloned().collect();
        entries.sort_by_key(|e| e.paused_at);
        Ok(entries)
    }

    async fn pause(&self, chat_id: &str, reason: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.paused.insert(chat_id.to_string(), PausedChatEntry {
            chat_id: chat_id.to_string(),
            reason: reason.map(String::from),
            paused_at: unix_now(),
        });
        Ok(())
    }

    async fn resume(&self, chat_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.paused.remove(chat_id).is_some())
    }
}
