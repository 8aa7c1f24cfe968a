//! Test doubles and a small dispatch harness.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    alya_bot::{
        BotSettings, CommandDescriptor, CommandDispatcher, ContextFactory, DispatchReport,
        GateDecision, MessageNormalizer, MessageStore, NormalizedMessage, PauseGate, PausedChats,
        SessionHandle,
        types::{GroupMetadata, MessageKey, RawMessage},
    },
    alya_config::AlyaConfig,
    alya_storage::InMemoryStore,
    anyhow::{Result, anyhow},
    async_trait::async_trait,
    serde_json::json,
};

pub const OWN_JID: &str = "100:1@s.whatsapp.net";

pub fn settings() -> BotSettings {
    let config = AlyaConfig {
        handlers: "^[.!]".into(),
        ..Default::default()
    };
    BotSettings::from_config(&config).unwrap_or_else(|e| panic!("bad test settings: {e}"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentText {
    pub jid: String,
    pub text: String,
    /// Id of the quoted message.
    pub quoted: Option<String>,
}

#[derive(Default)]
pub struct RecordingSession {
    sent: Mutex<Vec<SentText>>,
    groups: HashMap<String, String>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, jid: &str, subject: &str) -> Self {
        self.groups.insert(jid.to_string(), subject.to_string());
        self
    }

    pub fn sent(&self) -> Vec<SentText> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SessionHandle for RecordingSession {
    fn user_id(&self) -> Option<String> {
        Some(OWN_JID.to_string())
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

    async fn read_messages(&self, _keys: &[MessageKey]) -> Result<()> {
        Ok(())
    }

    async fn group_metadata(&self, jid: &str) -> Result<GroupMetadata> {
        let subject = self
            .groups
            .get(jid)
            .ok_or_else(|| anyhow!("unknown group {jid}"))?;
        Ok(GroupMetadata {
            id: jid.to_string(),
            subject: subject.clone(),
            participants: Vec::new(),
        })
    }

    async fn download_media(&self, _message: &RawMessage) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Runs real normalization, gate and dispatch against a recording session.
pub struct Harness {
    pub session: Arc<RecordingSession>,
    normalizer: MessageNormalizer,
    dispatcher: CommandDispatcher,
    gate: PauseGate,
}

impl Harness {
    pub fn new(commands: Vec<CommandDescriptor>) -> Self {
        let settings = Arc::new(settings());
        let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
        let paused: Arc<dyn PausedChats> = Arc::new(InMemoryStore::new());
        Self {
            session: Arc::new(RecordingSession::new()),
            normalizer: MessageNormalizer::new(Arc::clone(&settings), Arc::clone(&store)),
            dispatcher: CommandDispatcher::new(
                commands,
                Arc::clone(&settings),
                ContextFactory::new(store),
            ),
            gate: PauseGate::new(settings.prefix.clone(), paused),
        }
    }

    pub fn with_paused(mut self, paused: Arc<dyn PausedChats>) -> Self {
        self.gate = PauseGate::new(settings().prefix, paused);
        self
    }

    fn message(&self, chat: &str, id: &str, body: &str, from_me: bool) -> NormalizedMessage {
        let raw: RawMessage = serde_json::from_value(json!({
            "key": {"remoteJid": chat, "id": id, "fromMe": from_me},
            "message": {"conversation": body},
            "pushName": "Tester"
        }))
        .unwrap_or_else(|e| panic!("bad raw message: {e}"));
        self.normalizer
            .normalize(&raw, Some(OWN_JID))
            .unwrap_or_else(|| panic!("message {id} did not normalize"))
    }

    /// A message from someone else.
    pub fn incoming(&self, chat: &str, id: &str, body: &str) -> NormalizedMessage {
        self.message(chat, id, body, false)
    }

    /// A message sent by the bot account itself.
    pub fn own(&self, chat: &str, id: &str, body: &str) -> NormalizedMessage {
        self.message(chat, id, body, true)
    }

    pub async fn gate(&self, message: &NormalizedMessage) -> GateDecision {
        self.gate.check(message).await
    }

    pub async fn dispatch(&self, message: NormalizedMessage) -> DispatchReport {
        let session: Arc<dyn SessionHandle> = Arc::clone(&self.session) as Arc<dyn SessionHandle>;
        self.dispatcher.dispatch(session, message).await
    }
}
