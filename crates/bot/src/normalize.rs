//! Raw transport record → [`NormalizedMessage`].

use std::sync::Arc;

use {
    anyhow::Result,
    serde_json::Value,
    tracing::{debug, trace},
};

use crate::{
    settings::{BotSettings, FALLBACK_PREFIX},
    store::MessageStore,
    transport::SessionHandle,
    types::{MessageKey, MessageType, RawMessage, STATUS_BROADCAST, is_group_jid, jid_user},
};

/// `protocolMessage.type` of a revoke ("delete for everyone") notice.
const PROTOCOL_REVOKE: u64 = 0;

/// Rides along with group content and never names its type.
const SENDER_KEY_DISTRIBUTION: &str = "senderKeyDistributionMessage";

/// Envelopes whose `.message` holds the real content.
const WRAPPER_KEYS: &[&str] = &[
    "ephemeralMessage",
    "viewOnceMessage",
    "viewOnceMessageV2",
    "viewOnceMessageV2Extension",
    "documentWithCaptionMessage",
];

/// Canonical shape of one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    pub id: String,
    pub chat_id: String,
    pub sender: String,
    pub push_name: Option<String>,
    pub kind: MessageType,
    /// Text content; `None` for kinds without text.
    pub body: Option<String>,
    pub from_me: bool,
    /// Sent by the bot's own account or a configured sudo number.
    pub sudo: bool,
    pub is_group: bool,
    /// Command prefix in effect, set during classification.
    pub prefix: char,
    pub key: MessageKey,
    /// Deep copy of the transport record.
    pub raw: RawMessage,
}

impl NormalizedMessage {
    /// The message content with ephemeral/view-once envelopes removed.
    pub fn content(&self) -> Option<&Value> {
        self.raw.message.as_ref().map(unwrap_content)
    }

    /// Id of the message a revoke notice refers to.
    ///
    /// Other protocol messages (edits, history sync, ephemeral settings)
    /// carry a key too but delete nothing.
    pub fn revoked_message_id(&self) -> Option<&str> {
        if self.kind != MessageType::Protocol {
            return None;
        }
        let protocol = self.content()?.get("protocolMessage")?;
        let revoke = match protocol.get("type") {
            None | Some(Value::Null) => true,
            Some(Value::Number(n)) => n.as_u64() == Some(PROTOCOL_REVOKE),
            Some(Value::String(s)) => s == "REVOKE",
            Some(_) => false,
        };
        if !revoke {
            return None;
        }
        protocol.get("key")?.get("id")?.as_str()
    }

    /// Body or, for non-text kinds, the type name.
    pub fn summary(&self) -> &str {
        self.body.as_deref().unwrap_or_else(|| self.kind.as_str())
    }
}

/// Derives the canonical message and performs the per-message side effects
/// (persistence, read receipts).
pub struct MessageNormalizer {
    settings: Arc<BotSettings>,
    store: Arc<dyn MessageStore>,
}

impl MessageNormalizer {
    pub fn new(settings: Arc<BotSettings>, store: Arc<dyn MessageStore>) -> Self {
        Self { settings, store }
    }

    /// Pure derivation. `None` when the record has no usable shape.
    pub fn normalize(&self, raw: &RawMessage, own_jid: Option<&str>) -> Option<NormalizedMessage> {
        let raw = raw.clone();
        let chat_id = raw.key.remote_jid.clone().filter(|j| !j.is_empty())?;
        let id = raw.key.id.clone().filter(|i| !i.is_empty())?;
        let content = raw.message.as_ref().map(unwrap_content)?;
        let kind = content_type(content)?;
        let body = text_body(content, &kind);

        let is_group = is_group_jid(&chat_id);
        let from_me = raw.key.from_me;
        let sender = if from_me {
            own_jid.map(normalize_own_jid).unwrap_or_else(|| chat_id.clone())
        } else if is_group {
            raw.key.participant.clone().filter(|p| !p.is_empty())?
        } else {
            // Status broadcasts name the author as participant.
            raw.key
                .participant
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| chat_id.clone())
        };
        let sudo = from_me || self.settings.is_sudo(&sender);

        Some(NormalizedMessage {
            id,
            chat_id,
            sender,
            push_name: raw.push_name.clone(),
            kind,
            body,
            from_me,
            sudo,
            is_group,
            prefix: FALLBACK_PREFIX,
            key: raw.key.clone(),
            raw,
        })
    }

    /// Normalize, persist, and acknowledge one inbound record.
    ///
    /// Persistence happens before the message is handed to any command so
    /// quote lookups can find it.
    pub async fn process(
        &self,
        raw: &RawMessage,
        session: &dyn SessionHandle,
    ) -> Result<Option<NormalizedMessage>> {
        let own_jid = session.user_id();
        let Some(message) = self.normalize(raw, own_jid.as_deref()) else {
            debug!(id = ?raw.key.id, "dropping message without usable shape");
            return Ok(None);
        };
        trace!(id = %message.id, kind = %message.kind, "normalized message");

        self.store.save_message(raw, &message.sender).await?;

        if self.settings.auto_read {
            session
                .read_messages(std::slice::from_ref(&message.key))
                .await?;
        }
        if self.settings.auto_status_read && message.chat_id == STATUS_BROADCAST {
            session
                .read_messages(std::slice::from_ref(&message.key))
                .await?;
        }

        Ok(Some(message))
    }
}

fn unwrap_content(message: &Value) -> &Value {
    let mut current = message;
    // Envelopes nest at most a couple of levels deep in practice.
    for _ in 0..4 {
        let inner = WRAPPER_KEYS
            .iter()
            .find_map(|k| current.get(*k).and_then(|w| w.get("message")));
        match inner {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// `conversation` when present, else the first `*Message` key. Key order is
/// not the sender's, so metadata keys must never be candidates.
fn content_type(content: &Value) -> Option<MessageType> {
    let object = content.as_object()?;
    if object.contains_key("conversation") {
        return Some(MessageType::Conversation);
    }
    object
        .keys()
        .find(|k| k.contains("Message") && k.as_str() != SENDER_KEY_DISTRIBUTION)
        .map(|k| MessageType::from_content_key(k))
}

fn text_body(content: &Value, kind: &MessageType) -> Option<String> {
    let text = match kind {
        MessageType::Conversation => content.get("conversation"),
        MessageType::ExtendedText => content.get("extendedTextMessage")?.get("text"),
        MessageType::Image => content.get("imageMessage")?.get("caption"),
        MessageType::Video => content.get("videoMessage")?.get("caption"),
        MessageType::Document => content.get("documentMessage")?.get("caption"),
        _ => None,
    };
    text.and_then(Value::as_str).map(String::from)
}

/// `15551234567:12@s.whatsapp.net` → `15551234567@s.whatsapp.net`.
pub(crate) fn normalize_own_jid(jid: &str) -> String {
    match jid.split_once('@') {
        Some((_, server)) => format!("{}@{server}", jid_user(jid)),
        None => jid.to_string(),
    }
}
