//! `pause` and `resume`: mute or unmute command dispatch in the current chat.
//!
//! Both are restricted to sudo senders. `resume` is the one command the pause
//! gate lets through in a muted chat.

use std::sync::Arc;

use {
    alya_bot::{CommandDescriptor, CommandPrefix, PausedChats, Trigger, handler_fn},
    tracing::info,
};

use crate::error::Result;

pub fn commands(
    prefix: &CommandPrefix,
    paused: &Arc<dyn PausedChats>,
) -> Result<Vec<CommandDescriptor>> {
    let registry = Arc::clone(paused);
    let pause = handler_fn(move |ctx, input| {
        let registry = Arc::clone(&registry);
        async move {
            let reason = input.text().filter(|r| !r.is_empty()).map(str::to_string);
            registry.pause(ctx.chat_id(), reason.as_deref()).await?;
            info!(chat_id = %ctx.chat_id(), ?reason, "chat paused");
            ctx.reply(&format!(
                "_Bot paused in this chat. Send {}resume to resume._",
                ctx.prefix()
            ))
            .await
        }
    });

    let registry = Arc::clone(paused);
    let resume = handler_fn(move |ctx, _input| {
        let registry = Arc::clone(&registry);
        async move {
            if registry.resume(ctx.chat_id()).await? {
                info!(chat_id = %ctx.chat_id(), "chat resumed");
                ctx.reply("_Bot resumed in this chat._").await
            } else {
                ctx.reply("_This chat is not paused._").await
            }
        }
    });

    Ok(vec![
        CommandDescriptor::new("pause", Trigger::Pattern(prefix.command_pattern("pause")?), pause)
            .description("Stop responding in this chat")
            .from_me_only(true),
        // Same regex the pause gate admits, so a muted chat can always resume.
        CommandDescriptor::new(
            "resume",
            Trigger::Pattern(prefix.resume_pattern().clone()),
            resume,
        )
        .description("Respond in this chat again")
        .from_me_only(true),
    ])
}
