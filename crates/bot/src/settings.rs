//! Runtime settings compiled once from [`AlyaConfig`].

use std::collections::HashSet;

use {
    alya_config::AlyaConfig,
    regex::{Regex, RegexBuilder},
};

use crate::{
    error::{Error, Result},
    types::jid_user,
};

/// Prefix reported to handlers when the body carries no recognised prefix.
pub const FALLBACK_PREFIX: char = '!';

/// Compiled form of the `handlers` pattern.
#[derive(Debug, Clone)]
pub struct CommandPrefix {
    source: String,
    handlers: Regex,
    resume: Regex,
}

impl CommandPrefix {
    pub fn new(handlers: &str) -> Result<Self> {
        let compiled = Regex::new(handlers).map_err(|e| Error::pattern(handlers, e))?;
        let resume_source = format!("{handlers}( ?resume)");
        let resume = RegexBuilder::new(&resume_source)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(|e| Error::pattern(resume_source.clone(), e))?;
        Ok(Self {
            source: handlers.to_string(),
            handlers: compiled,
            resume,
        })
    }

    /// The pattern as configured.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// First character of the body, lower-cased, when the body matches the
    /// handler pattern; [`FALLBACK_PREFIX`] otherwise.
    pub fn resolve(&self, body: Option<&str>) -> char {
        body.filter(|b| self.handlers.is_match(b))
            .and_then(|b| b.chars().next())
            .and_then(|c| c.to_lowercase().next())
            .unwrap_or(FALLBACK_PREFIX)
    }

    /// Whether the body is the resume command.
    pub fn is_resume(&self, body: Option<&str>) -> bool {
        body.is_some_and(|b| self.resume.is_match(b))
    }

    /// The pattern [`is_resume`](Self::is_resume) tests against, for use as
    /// the resume command's trigger.
    pub fn resume_pattern(&self) -> &Regex {
        &self.resume
    }

    /// Build a case-insensitive command pattern anchored on this prefix,
    /// e.g. `command_pattern("ping")` matches `.ping`, `!PING now`.
    pub fn command_pattern(&self, command: &str) -> Result<Regex> {
        let prefix = self.source.strip_prefix('^').unwrap_or(&self.source);
        let source = format!(r"^(?:{prefix})\s*{}(?:\s|$)", regex::escape(command));
        RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::pattern(source.clone(), e))
    }
}

/// Behaviour toggles shared by the pipeline stages.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub prefix: CommandPrefix,
    /// User parts of privileged senders.
    pub sudo: HashSet<String>,
    pub auto_read: bool,
    pub auto_status_read: bool,
    pub logs: bool,
    pub work_type: String,
}

impl BotSettings {
    pub fn from_config(config: &AlyaConfig) -> Result<Self> {
        Ok(Self {
            prefix: CommandPrefix::new(&config.handlers)?,
            sudo: config
                .sudo
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            auto_read: config.auto_read,
            auto_status_read: config.auto_status_read,
            logs: config.logs,
            work_type: config.work_type.clone(),
        })
    }

    /// Whether the sender jid belongs to a configured sudo number.
    pub fn is_sudo(&self, sender: &str) -> bool {
        self.sudo.contains(jid_user(sender))
    }
}
