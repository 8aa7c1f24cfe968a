//! Command descriptors: a trigger paired with a handler.

use std::{fmt, future::Future, sync::Arc};

use {anyhow::Result, async_trait::async_trait, regex::Regex};

use crate::context::Context;

/// What makes a descriptor fire. Exactly one branch applies per descriptor.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Body matches the regex.
    Pattern(Regex),
    /// Any non-empty body.
    Text,
    Image,
    Sticker,
    Video,
    /// A revoke notice for an earlier message.
    Delete,
    /// Every message.
    Any,
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pattern(_) => "pattern",
            Self::Text => "text",
            Self::Image => "image",
            Self::Sticker => "sticker",
            Self::Video => "video",
            Self::Delete => "delete",
            Self::Any => "any",
        }
    }
}

/// Argument handed to a handler alongside its context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandInput {
    /// Body with the first pattern match removed. `None` when the removal
    /// could not be computed.
    Pattern { residual: Option<String> },
    /// The full body.
    Text { body: String },
    /// No argument; read the message through the context.
    Message,
}

impl CommandInput {
    /// Residual or body text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Pattern { residual } => residual.as_deref(),
            Self::Text { body } => Some(body),
            Self::Message => None,
        }
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(&self, ctx: Context, input: CommandInput) -> Result<()>;
}

/// Adapts an async closure into a [`CommandHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(Context, CommandInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn call(&self, ctx: Context, input: CommandInput) -> Result<()> {
        (self.0)(ctx, input).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(Context, CommandInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// One registered command.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    pub trigger: Trigger,
    /// Only sudo senders (or the bot itself) may trigger it.
    pub from_me_only: bool,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>, trigger: Trigger, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            trigger,
            from_me_only: false,
            handler,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn from_me_only(mut self, from_me_only: bool) -> Self {
        self.from_me_only = from_me_only;
        self
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("trigger", &self.trigger.name())
            .field("from_me_only", &self.from_me_only)
            .finish_non_exhaustive()
    }
}
