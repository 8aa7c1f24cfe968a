//! Commands that ship with the bot.

pub mod alive;
pub mod menu;
pub mod pause;
pub mod ping;

use std::sync::Arc;

use alya_bot::{CommandDescriptor, CommandPrefix, PausedChats};

use crate::{error::Result, registry::Plugin};

/// `ping`, `pause`, `resume` and `alive`.
pub struct BundledPlugin {
    paused: Arc<dyn PausedChats>,
    work_type: String,
}

impl BundledPlugin {
    pub fn new(paused: Arc<dyn PausedChats>, work_type: &str) -> Self {
        Self {
            paused,
            work_type: work_type.to_string(),
        }
    }
}

impl Plugin for BundledPlugin {
    fn name(&self) -> &str {
        "bundled"
    }

    fn commands(&self, prefix: &CommandPrefix) -> Result<Vec<CommandDescriptor>> {
        let mut commands = vec![ping::command(prefix)?];
        commands.extend(pause::commands(prefix, &self.paused)?);
        commands.push(alive::command(prefix, &self.work_type)?);
        Ok(commands)
    }
}
