//! `alive`: status line with mode and uptime.

use std::time::Duration;

use {
    alya_bot::{BOT_NAME, CommandDescriptor, CommandPrefix, Trigger, handler_fn},
    tokio::time::Instant,
};

use crate::error::Result;

pub fn command(prefix: &CommandPrefix, work_type: &str) -> Result<CommandDescriptor> {
    let started = Instant::now();
    let work_type = work_type.to_string();
    let handler = handler_fn(move |ctx, _input| {
        let text = format!(
            "*{BOT_NAME} is alive*\n\nMode: {work_type}\nUptime: {}",
            format_uptime(started.elapsed())
        );
        async move { ctx.reply(&text).await }
    });
    Ok(
        CommandDescriptor::new("alive", Trigger::Pattern(prefix.command_pattern("alive")?), handler)
            .description("Show bot status"),
    )
}

fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (days, hours, minutes, seconds) =
        (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60, secs % 60);
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
