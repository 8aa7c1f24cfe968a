//! Pause gate: muted chats only let the resume command through.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{normalize::NormalizedMessage, settings::CommandPrefix, store::PausedChats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    /// Chat is paused; nothing further may happen for this message.
    Suppressed,
}

pub struct PauseGate {
    prefix: CommandPrefix,
    registry: Arc<dyn PausedChats>,
}

impl PauseGate {
    pub fn new(prefix: CommandPrefix, registry: Arc<dyn PausedChats>) -> Self {
        Self { prefix, registry }
    }

    /// Decide whether the message may continue to dispatch.
    ///
    /// A registry failure lets the message through.
    pub async fn check(&self, message: &NormalizedMessage) -> GateDecision {
        let is_resume = self.prefix.is_resume(message.body.as_deref());

        let paused = match self.registry.paused_chats().await {
            Ok(entries) => entries.iter().any(|e| e.chat_id == message.chat_id),
            Err(e) => {
                warn!(chat_id = %message.chat_id, error = %e, "paused chat lookup failed, continuing");
                false
            },
        };

        if paused && !is_resume {
            debug!(chat_id = %message.chat_id, "chat paused, suppressing");
            return GateDecision::Suppressed;
        }
        GateDecision::Proceed
    }
}
