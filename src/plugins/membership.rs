use tracing::{debug, info};

use crate::{common::md_bold, plugins::welcome, Context, Event, Outgoing, Result, SystemChannel};

pub fn departure(display_name: &str) -> String {
    format!("{} left the server.", md_bold(display_name))
}

// member joins get a welcome card, member leaves a one line notice, both in
// the server's matching system channel
pub async fn on_event(ctx: &Context, event: &Event) -> Result<()> {
    let conf = &ctx.conf.welcome;
    let (server, user, kind) = match event {
        Event::MemberJoined { server, user } if conf.on_join => {
            (server, user, SystemChannel::UserJoined)
        }
        Event::MemberLeft { server, user } if conf.on_leave => {
            (server, user, SystemChannel::UserLeft)
        }
        _ => return Ok(()),
    };

    let Some(channel) = ctx.chat.system_channel(server, kind).await? else {
        debug!(server, ?kind, "no system channel, skipping");
        return Ok(());
    };
    let profile = ctx.chat.profile(user).await?;
    info!(server, user, ?kind, "membership change");

    match kind {
        SystemChannel::UserJoined => welcome::welcome(ctx, &profile, &channel).await,
        SystemChannel::UserLeft => {
            ctx.chat
                .send(&channel, Outgoing::text(departure(&profile.display_name)))
                .await
        }
    }
}
