//! `menu`: list registered commands with their descriptions.

use alya_bot::{BOT_NAME, CommandDescriptor, CommandPrefix, Trigger, handler_fn};

use crate::error::Result;

const DESCRIPTION: &str = "List available commands";

struct Entry {
    name: String,
    description: String,
    sudo: bool,
}

fn render(prefix: char, entries: &[Entry]) -> String {
    let mut text = format!("*{BOT_NAME} commands*\n");
    for entry in entries {
        text.push_str(&format!("\n{prefix}{}", entry.name));
        if !entry.description.is_empty() {
            text.push_str(&format!(" - {}", entry.description));
        }
        if entry.sudo {
            text.push_str(" (sudo)");
        }
    }
    text
}

/// Build `menu` over `existing`; the menu lists itself last.
pub fn command(prefix: &CommandPrefix, existing: &[CommandDescriptor]) -> Result<CommandDescriptor> {
    let mut entries: Vec<Entry> = existing
        .iter()
        .map(|c| Entry {
            name: c.name.clone(),
            description: c.description.clone(),
            sudo: c.from_me_only,
        })
        .collect();
    entries.push(Entry {
        name: "menu".into(),
        description: DESCRIPTION.into(),
        sudo: false,
    });

    let handler = handler_fn(move |ctx, _input| {
        let text = render(ctx.prefix(), &entries);
        async move { ctx.reply(&text).await }
    });
    Ok(
        CommandDescriptor::new("menu", Trigger::Pattern(prefix.command_pattern("menu")?), handler)
            .description(DESCRIPTION),
    )
}
