//! In-crate fakes for unit tests.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    anyhow::{Result, bail},
    async_trait::async_trait,
};

use crate::{
    store::{MessageStore, PausedChatEntry, PausedChats},
    transport::SessionHandle,
    types::{ChatUpdate, GroupMetadata, MessageKey, RawMessage},
};

#[derive(Debug, Clone, PartialEq)]
pub struct SentText {
    pub jid: String,
    pub text: String,
    pub quoted: Option<String>,
}

/// Session double recording everything sent through it.
pub struct FakeSession {
    user_id: Option<String>,
    sent: Mutex<Vec<SentText>>,
    reads: Mutex<Vec<MessageKey>>,
    closed: AtomicBool,
    groups: Mutex<HashMap<String, String>>,
}

impl FakeSession {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            sent: Mutex::new(Vec::new()),
            reads: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_group(self, jid: &str, subject: &str) -> Self {
        self.groups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(jid.to_string(), subject.to_string());
        self
    }

    pub fn sent(&self) -> Vec<SentText> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn reads(&self) -> Vec<MessageKey> {
        self.reads.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionHandle for FakeSession {
    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    async fn send_text(&self, jid: &str, text: &str, quoted: Option<&RawMessage>) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentText {
                jid: jid.to_string(),
                text: text.to_string(),
                quoted: quoted.and_then(|q| q.key.id.clone()),
            });
        Ok(())
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<()> {
        self.reads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(keys);
        Ok(())
    }

    async fn group_metadata(&self, jid: &str) -> Result<GroupMetadata> {
        let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        match groups.get(jid) {
            Some(subject) => Ok(GroupMetadata {
                id: jid.to_string(),
                subject: subject.clone(),
                participants: Vec::new(),
            }),
            None => bail!("unknown group {jid}"),
        }
    }

    async fn download_media(&self, message: &RawMessage) -> Result<Vec<u8>> {
        Ok(message.key.id.clone().unwrap_or_default().into_bytes())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    messages: Mutex<HashMap<String, (RawMessage, String)>>,
    chats: Mutex<Vec<ChatUpdate>>,
}

impl MemoryStore {
    pub fn sender_of(&self, id: &str) -> Option<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|(_, sender)| sender.clone())
    }

    pub fn chats(&self) -> Vec<ChatUpdate> {
        self.chats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn load_message(&self, id: &str) -> Result<Option<RawMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|(m, _)| m.clone()))
    }

    async fn save_message(&self, message: &RawMessage, sender: &str) -> Result<()> {
        let Some(id) = message.key.id.clone() else {
            bail!("message without id");
        };
        if id.starts_with("fail") {
            bail!("refusing message {id}");
        }
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, (message.clone(), sender.to_string()));
        Ok(())
    }

    async fn save_chat(&self, chat: &ChatUpdate) -> Result<()> {
        if chat.id.starts_with("fail") {
            bail!("refusing chat {}", chat.id);
        }
        self.chats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(chat.clone());
        Ok(())
    }

    async fn get_name(&self, sender: &str) -> Result<Option<String>> {
        Ok(self
            .messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|(_, s)| s == sender)
            .and_then(|(m, _)| m.push_name.clone()))
    }
}

/// Paused-chat registry that can be told to fail.
#[derive(Default)]
pub struct MemoryPaused {
    entries: Mutex<Vec<PausedChatEntry>>,
    failing: AtomicBool,
}

impl MemoryPaused {
    pub fn with_paused(chat_ids: &[&str]) -> Arc<Self> {
        let registry = Self::default();
        {
            let mut entries = registry.entries.lock().unwrap_or_else(|e| e.into_inner());
            for chat_id in chat_ids {
                entries.push(PausedChatEntry {
                    chat_id: chat_id.to_string(),
                    reason: None,
                    paused_at: 0,
                });
            }
        }
        Arc::new(registry)
    }

    pub fn failing() -> Arc<Self> {
        let registry = Self::default();
        registry.failing.store(true, Ordering::SeqCst);
        Arc::new(registry)
    }
}

#[async_trait]
impl PausedChats for MemoryPaused {
    async fn paused_chats(&self) -> Result<Vec<PausedChatEntry>> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("registry unavailable");
        }
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn pause(&self, chat_id: &str, reason: Option<&str>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|e| e.chat_id != chat_id);
        entries.push(PausedChatEntry {
            chat_id: chat_id.to_string(),
            reason: reason.map(String::from),
            paused_at: 0,
        });
        Ok(())
    }

    async fn resume(&self, chat_id: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|e| e.chat_id != chat_id);
        Ok(entries.len() != before)
    }
}
