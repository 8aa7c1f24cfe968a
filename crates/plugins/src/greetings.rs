//! Welcome and goodbye messages for group membership changes.

use std::sync::Arc;

use {
    alya_bot::{
        Greeter, SessionHandle,
        types::{ParticipantAction, ParticipantsUpdate, is_group_jid, jid_user},
    },
    alya_config::GreetingsConfig,
    async_trait::async_trait,
    tracing::{debug, warn},
};

#[derive(Debug, Clone, Default)]
pub struct Greetings {
    welcome: Option<String>,
    goodbye: Option<String>,
}

impl Greetings {
    pub fn new(welcome: Option<String>, goodbye: Option<String>) -> Self {
        let keep = |t: Option<String>| t.filter(|t| !t.trim().is_empty());
        Self {
            welcome: keep(welcome),
            goodbye: keep(goodbye),
        }
    }

    pub fn from_config(config: &GreetingsConfig) -> Self {
        Self::new(config.welcome.clone(), config.goodbye.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.welcome.is_some() || self.goodbye.is_some()
    }

    fn template(&self, action: ParticipantAction) -> Option<&str> {
        match action {
            ParticipantAction::Add => self.welcome.as_deref(),
            ParticipantAction::Remove => self.goodbye.as_deref(),
            _ => None,
        }
    }
}

/// Fill `{user}` with a mention of the participant and `{group}` with the
/// group subject.
fn render(template: &str, participant: &str, group: &str) -> String {
    template
        .replace("{user}", &format!("@{}", jid_user(participant)))
        .replace("{group}", group)
}

#[async_trait]
impl Greeter for Greetings {
    async fn greet(
        &self,
        update: &ParticipantsUpdate,
        session: Arc<dyn SessionHandle>,
    ) -> anyhow::Result<()> {
        let Some(template) = self.template(update.action) else {
            return Ok(());
        };
        if !is_group_jid(&update.id) {
            debug!(chat_id = %update.id, "participant update outside a group");
            return Ok(());
        }

        let subject = if template.contains("{group}") {
            match session.group_metadata(&update.id).await {
                Ok(meta) => meta.subject,
                Err(e) => {
                    warn!(chat_id = %update.id, error = %e, "group subject unavailable");
                    update.id.clone()
                },
            }
        } else {
            String::new()
        };

        for participant in &update.participants {
            let text = render(template, participant, &subject);
            session.send_text(&update.id, &text, None).await?;
        }
        Ok(())
    }
}
