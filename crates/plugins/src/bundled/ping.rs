//! `ping`: reply, then report how long the reply took to go out.

use {
    alya_bot::{CommandDescriptor, CommandPrefix, Trigger, handler_fn},
    tokio::time::Instant,
};

use crate::error::Result;

pub fn command(prefix: &CommandPrefix) -> Result<CommandDescriptor> {
    let pattern = prefix.command_pattern("ping")?;
    let handler = handler_fn(|ctx, _input| async move {
        let started = Instant::now();
        ctx.reply("*Pong!*").await?;
        let latency = started.elapsed().as_millis();
        ctx.send(&format!("_Latency: {latency} ms_")).await
    });
    Ok(CommandDescriptor::new("ping", Trigger::Pattern(pattern), handler)
        .description("Check response latency"))
}
