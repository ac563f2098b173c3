//! Welcome cards: avatar, palette, layout, raster, send.
//!
//! Both triggers (the `welcome` command here and member joins in
//! `plugins::membership`) end up in [`welcome`].

pub mod palette;
pub mod render;
pub mod scene;
pub mod text;

use tracing::debug;

use crate::{
    common::{first_mention, md_bold, Command},
    AvatarFetcher, BotError, Context, Event, Outgoing, Profile, Result,
};
use palette::Palette;
use text::Typeface;

#[derive(Debug, Clone)]
pub struct Rendered {
    pub filename: String,
    pub png: Vec<u8>,
}

/// Avatar bytes for `user`, or the fallback square when they have none.
pub async fn acquire_avatar<F: AvatarFetcher + ?Sized>(fetcher: &F, user: &str) -> Result<Vec<u8>> {
    let bytes = fetcher.fetch_avatar(user, true).await?;
    if bytes.is_empty() {
        debug!(user, "no avatar, using fallback");
        return render::fallback_avatar();
    }
    Ok(bytes)
}

/// Decode, extract the palette, lay out and rasterise. CPU bound.
pub fn welcome_card(
    name: &str,
    avatar: &[u8],
    subtitle: &str,
    typeface: &Typeface,
) -> Result<Rendered> {
    let img = image::load_from_memory(avatar)?;
    let palette = Palette::from_image(&img);

    let scene = scene::compose(&img, &palette, name, subtitle, typeface);
    debug!(
        border = %scene.layout.border.color,
        name = %scene.layout.captions[2].text,
        "composed welcome card"
    );

    Ok(Rendered {
        filename: String::from(render::FILENAME),
        png: render::render(&scene, typeface)?,
    })
}

pub fn caption(display_name: &str) -> String {
    md_bold(&format!("Hello, {display_name}; Welcome!"))
}

/// Renders a card for `profile` and posts it to `channel`.
pub async fn welcome(ctx: &Context, profile: &Profile, channel: &str) -> Result<()> {
    let avatar = acquire_avatar(ctx.chat.as_ref(), &profile.id).await?;

    let name = profile.display_name.clone();
    let subtitle = ctx.conf.welcome.subtitle.clone();
    let typeface = ctx.typeface.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        welcome_card(&name, &avatar, &subtitle, &typeface)
    })
    .await
    .map_err(|e| BotError::Render(e.to_string()))??;

    let message = Outgoing::text(caption(&profile.display_name)).attach(rendered.filename, rendered.png);
    ctx.chat.send(channel, message).await
}

pub async fn on_event(ctx: &Context, event: &Event) -> Result<()> {
    let Event::Message(message) = event else {
        return Ok(());
    };
    if !ctx.conf.welcome.enabled || message.author != ctx.self_id {
        return Ok(());
    }
    let Some(command) = Command::parse(&message.content, &ctx.conf.prefix) else {
        return Ok(());
    };
    if command.name != "welcome" {
        return Ok(());
    }

    let user = first_mention(&message.content)
        .ok_or_else(|| BotError::MissingMention(message.content.clone()))?;
    let profile = ctx.chat.profile(user).await?;
    debug!(user, channel = %message.channel, "welcome command");

    welcome(ctx, &profile, &message.channel).await
}
