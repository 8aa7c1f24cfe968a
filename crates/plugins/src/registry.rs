//! Ordered command registry handed to the dispatcher.

use std::sync::Arc;

use {
    alya_bot::{BotSettings, CommandDescriptor, CommandPrefix, PausedChats},
    tracing::{debug, info},
};

use crate::{
    bundled::{BundledPlugin, menu},
    error::{Error, Result},
};

/// A named bundle of commands.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Descriptors to register, built against the configured prefix.
    fn commands(&self, prefix: &CommandPrefix) -> Result<Vec<CommandDescriptor>>;
}

#[derive(Debug, Default)]
pub struct PluginRegistry {
    commands: Vec<CommandDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled commands followed by `menu`, which lists all of them.
    pub fn with_bundled(settings: &BotSettings, paused: Arc<dyn PausedChats>) -> Result<Self> {
        let mut registry = Self::new();
        registry.install(&BundledPlugin::new(paused, &settings.work_type), &settings.prefix)?;
        registry.add_menu(&settings.prefix)?;
        Ok(registry)
    }

    /// Append one descriptor. Names are unique.
    pub fn register(&mut self, descriptor: CommandDescriptor) -> Result<()> {
        if self.commands.iter().any(|c| c.name == descriptor.name) {
            return Err(Error::duplicate(descriptor.name));
        }
        debug!(command = %descriptor.name, trigger = descriptor.trigger.name(), "command registered");
        self.commands.push(descriptor);
        Ok(())
    }

    pub fn install(&mut self, plugin: &dyn Plugin, prefix: &CommandPrefix) -> Result<()> {
        let commands = plugin.commands(prefix)?;
        let count = commands.len();
        for descriptor in commands {
            self.register(descriptor)?;
        }
        info!(plugin = plugin.name(), commands = count, "plugin installed");
        Ok(())
    }

    /// Register `menu` over everything registered so far, itself included.
    pub fn add_menu(&mut self, prefix: &CommandPrefix) -> Result<()> {
        let descriptor = menu::command(prefix, &self.commands)?;
        self.register(descriptor)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.name.as_str())
    }

    pub fn into_commands(self) -> Vec<CommandDescriptor> {
        self.commands
    }
}
