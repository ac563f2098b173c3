use tracing::debug;

use crate::{
    common::{lenient_count, Command},
    Context, Event, Outgoing, Result,
};

/// How many times `-spam <n> <text>` should send, after the configured cap.
pub fn repeats(count: i64, max_repeats: Option<u32>) -> u64 {
    let count = count.max(0) as u64;
    match max_repeats {
        Some(max) => count.min(max as u64),
        None => count,
    }
}

pub async fn on_event(ctx: &Context, event: &Event) -> Result<()> {
    let Event::Message(message) = event else {
        return Ok(());
    };
    if !ctx.conf.spam.enabled || message.author != ctx.self_id {
        return Ok(());
    }
    let Some(command) = Command::parse(&message.content, &ctx.conf.prefix) else {
        return Ok(());
    };
    if command.name != "spam" {
        return Ok(());
    }

    let text = command.text_after(1);
    let times = repeats(
        lenient_count(command.args.first().copied()),
        ctx.conf.spam.max_repeats,
    );
    if text.is_empty() {
        debug!("spam without text, nothing to send");
        return Ok(());
    }

    debug!(times, channel = %message.channel, "spam");
    // one at a time, each send finishes before the next starts
    for _ in 0..times {
        ctx.chat.send(&message.channel, Outgoing::text(text)).await?;
    }
    Ok(())
}
