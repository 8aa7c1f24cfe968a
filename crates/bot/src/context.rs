//! Per-dispatch context handed to command handlers.

use std::sync::Arc;

use anyhow::{Result, bail};

use crate::{
    command::CommandInput,
    dispatch::TriggerMatch,
    normalize::NormalizedMessage,
    store::MessageStore,
    transport::SessionHandle,
    types::RawMessage,
};

/// Which wrapper variant a handler receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKind {
    /// Pattern and text triggers.
    Message,
    Image,
    Sticker,
    Video,
    Deletion { message_id: String },
    /// Catch-all trigger; the message may be of any type.
    Any,
}

/// Session and message access scoped to one handler invocation.
#[derive(Clone)]
pub struct Context {
    session: Arc<dyn SessionHandle>,
    message: Arc<NormalizedMessage>,
    store: Arc<dyn MessageStore>,
    kind: ContextKind,
}

impl Context {
    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    pub fn message(&self) -> &NormalizedMessage {
        &self.message
    }

    pub fn session(&self) -> &Arc<dyn SessionHandle> {
        &self.session
    }

    pub fn chat_id(&self) -> &str {
        &self.message.chat_id
    }

    pub fn prefix(&self) -> char {
        self.message.prefix
    }

    /// Reply in the same chat, quoting the triggering message.
    pub async fn reply(&self, text: &str) -> Result<()> {
        self.session
            .send_text(&self.message.chat_id, text, Some(&self.message.raw))
            .await
    }

    /// Send to the same chat without quoting.
    pub async fn send(&self, text: &str) -> Result<()> {
        self.session.send_text(&self.message.chat_id, text, None).await
    }

    /// Media bytes of the triggering message.
    pub async fn download_media(&self) -> Result<Vec<u8>> {
        match self.kind {
            ContextKind::Image | ContextKind::Sticker | ContextKind::Video => {},
            ContextKind::Message | ContextKind::Any if self.message.kind.is_media() => {},
            _ => bail!("message {} carries no media", self.message.id),
        }
        self.session.download_media(&self.message.raw).await
    }

    pub fn deleted_message_id(&self) -> Option<&str> {
        match &self.kind {
            ContextKind::Deletion { message_id } => Some(message_id),
            _ => None,
        }
    }

    /// The stored copy of the message a revoke notice refers to.
    pub async fn load_deleted(&self) -> Result<Option<RawMessage>> {
        match self.deleted_message_id() {
            Some(id) => self.store.load_message(id).await,
            None => Ok(None),
        }
    }
}

/// Selects and populates the context variant for a matched trigger.
pub struct ContextFactory {
    store: Arc<dyn MessageStore>,
}

impl ContextFactory {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    pub fn build(
        &self,
        session: Arc<dyn SessionHandle>,
        message: Arc<NormalizedMessage>,
        matched: &TriggerMatch,
    ) -> (Context, CommandInput) {
        let (kind, input) = match matched {
            TriggerMatch::Pattern { residual } => (ContextKind::Message, CommandInput::Pattern {
                residual: residual.clone(),
            }),
            TriggerMatch::Text { body } => {
                (ContextKind::Message, CommandInput::Text { body: body.clone() })
            },
            TriggerMatch::Image => (ContextKind::Image, CommandInput::Message),
            TriggerMatch::Sticker => (ContextKind::Sticker, CommandInput::Message),
            TriggerMatch::Video => (ContextKind::Video, CommandInput::Message),
            TriggerMatch::Delete { message_id } => (
                ContextKind::Deletion {
                    message_id: message_id.clone(),
                },
                CommandInput::Message,
            ),
            TriggerMatch::Any => (ContextKind::Any, CommandInput::Message),
        };
        let ctx = Context {
            session,
            message,
            store: Arc::clone(&self.store),
            kind,
        };
        (ctx, input)
    }
}
