//! Command dispatch: evaluate every descriptor against one message and run
//! the matches concurrently, each in its own task.

use std::sync::Arc;

use {
    futures::future::join_all,
    regex::{Regex, RegexBuilder},
    tracing::{debug, error, warn},
};

use crate::{
    command::{CommandDescriptor, Trigger},
    context::ContextFactory,
    normalize::NormalizedMessage,
    settings::BotSettings,
    transport::SessionHandle,
    types::MessageType,
};

/// How a descriptor's trigger matched, with the data its branch extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerMatch {
    Pattern { residual: Option<String> },
    Text { body: String },
    Image,
    Sticker,
    Video,
    Delete { message_id: String },
    Any,
}

/// A descriptor selected for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Position in the registry.
    pub index: usize,
    pub name: String,
    pub matched: TriggerMatch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

pub struct CommandDispatcher {
    commands: Arc<Vec<CommandDescriptor>>,
    settings: Arc<BotSettings>,
    factory: ContextFactory,
}

impl CommandDispatcher {
    pub fn new(
        commands: Vec<CommandDescriptor>,
        settings: Arc<BotSettings>,
        factory: ContextFactory,
    ) -> Self {
        Self {
            commands: Arc::new(commands),
            settings,
            factory,
        }
    }

    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    /// Attach the resolved command prefix to the message.
    pub fn classify(&self, message: &mut NormalizedMessage) {
        message.prefix = self.settings.prefix.resolve(message.body.as_deref());
    }

    /// Every descriptor that fires for this message. No I/O.
    pub fn plan(&self, message: &NormalizedMessage) -> Vec<Invocation> {
        self.commands
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.from_me_only || message.sudo)
            .filter_map(|(index, d)| {
                evaluate(&d.trigger, message).map(|matched| Invocation {
                    index,
                    name: d.name.clone(),
                    matched,
                })
            })
            .collect()
    }

    /// Classify, plan, and run all matching handlers.
    ///
    /// Each handler runs in its own task; a failing or panicking handler is
    /// logged and never affects its siblings.
    pub async fn dispatch(
        &self,
        session: Arc<dyn SessionHandle>,
        mut message: NormalizedMessage,
    ) -> DispatchReport {
        self.classify(&mut message);
        let message = Arc::new(message);
        let plan = self.plan(&message);
        if plan.is_empty() {
            return DispatchReport::default();
        }
        debug!(id = %message.id, matched = plan.len(), "dispatching message");

        let mut names = Vec::with_capacity(plan.len());
        let mut tasks = Vec::with_capacity(plan.len());
        for invocation in plan {
            let Some(descriptor) = self.commands.get(invocation.index) else {
                continue;
            };
            let handler = Arc::clone(&descriptor.handler);
            let (ctx, input) =
                self.factory
                    .build(Arc::clone(&session), Arc::clone(&message), &invocation.matched);
            names.push(invocation.name);
            tasks.push(tokio::spawn(async move { handler.call(ctx, input).await }));
        }

        let mut report = DispatchReport {
            invoked: tasks.len(),
            failed: 0,
        };
        for (name, result) in names.iter().zip(join_all(tasks).await) {
            match result {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(command = %name, chat_id = %message.chat_id, error = %e, "command failed");
                },
                Err(e) => {
                    report.failed += 1;
                    error!(command = %name, chat_id = %message.chat_id, error = %e, "command task aborted");
                },
            }
        }
        report
    }
}

fn evaluate(trigger: &Trigger, message: &NormalizedMessage) -> Option<TriggerMatch> {
    match trigger {
        Trigger::Pattern(pattern) => {
            let body = message.body.as_deref()?;
            pattern.is_match(body).then(|| TriggerMatch::Pattern {
                residual: residual(pattern, body),
            })
        },
        Trigger::Text => message
            .body
            .as_deref()
            .filter(|b| !b.is_empty())
            .map(|body| TriggerMatch::Text {
                body: body.to_string(),
            }),
        Trigger::Image => (message.kind == MessageType::Image).then_some(TriggerMatch::Image),
        Trigger::Sticker => (message.kind == MessageType::Sticker).then_some(TriggerMatch::Sticker),
        Trigger::Video => (message.kind == MessageType::Video).then_some(TriggerMatch::Video),
        Trigger::Delete => message
            .revoked_message_id()
            .map(|id| TriggerMatch::Delete {
                message_id: id.to_string(),
            }),
        Trigger::Any => Some(TriggerMatch::Any),
    }
}

/// Body with the first match removed, case-insensitively, then trimmed.
fn residual(pattern: &Regex, body: &str) -> Option<String> {
    let insensitive = RegexBuilder::new(pattern.as_str())
        .case_insensitive(true)
        .build()
        .ok()?;
    Some(insensitive.replacen(body, 1, "").trim().to_string())
}
