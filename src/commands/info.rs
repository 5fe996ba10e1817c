//! Informational commands
//!
//! Handles: ping, serverinfo, date, help

use anyhow::Result;
use chrono::{FixedOffset, Utc};
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::channel::ChannelType;
use serenity::prelude::Context;
use std::sync::Arc;

use super::{respond_text, CommandContext};

/// Kathmandu is UTC+5:45
const NEPAL_OFFSET_SECONDS: i32 = 5 * 3600 + 45 * 60;

pub fn create_commands() -> Vec<CreateApplicationCommand> {
    let simple: [(&str, &str); 4] = [
        ("ping", "Check whether the bot is awake"),
        ("serverinfo", "Show information about this server"),
        ("date", "Current date and time in Nepal"),
        ("help", "List what the bot can do"),
    ];
    simple
        .iter()
        .map(|(name, description)| {
            CreateApplicationCommand::default()
                .name(*name)
                .description(*description)
                .to_owned()
        })
        .collect()
}

pub async fn handle(
    ctx: Arc<CommandContext>,
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<()> {
    match command.data.name.as_str() {
        "ping" => {
            let uptime = ctx.start_time.elapsed();
            let (hours, minutes) = (uptime.as_secs() / 3600, (uptime.as_secs() % 3600) / 60);
            respond_text(
                serenity_ctx,
                command,
                &format!("🏓 Pong! Up for {hours}h {minutes}m."),
                false,
            )
            .await
        }
        "serverinfo" => handle_serverinfo(serenity_ctx, command).await,
        "date" => {
            let offset = FixedOffset::east_opt(NEPAL_OFFSET_SECONDS).unwrap();
            let now = Utc::now().with_timezone(&offset);
            let text = format!(
                "📅 **{}**\n🕐 {} (Nepal Time, UTC+5:45)",
                now.format("%A, %B %d, %Y"),
                now.format("%I:%M %p")
            );
            respond_text(serenity_ctx, command, &text, false).await
        }
        "help" => respond_text(serenity_ctx, command, HELP_TEXT, false).await,
        _ => Ok(()),
    }
}

async fn handle_serverinfo(
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<()> {
    let Some(guild) = command
        .guild_id
        .and_then(|id| serenity_ctx.cache.guild(id))
    else {
        return respond_text(serenity_ctx, command, "This only works inside a server.", true)
            .await;
    };

    let mut text_channels = 0;
    let mut voice_channels = 0;
    for channel in guild.channels.values() {
        if let Some(guild_channel) = channel.clone().guild() {
            match guild_channel.kind {
                ChannelType::Text => text_channels += 1,
                ChannelType::Voice => voice_channels += 1,
                _ => {}
            }
        }
    }

    let info = format!(
        "🏰 **Server information**\n\
         **Name:** {}\n\
         **ID:** {}\n\
         **Owner:** <@{}>\n\
         **Created:** <t:{}:D>\n\
         **Members:** {}\n\
         **Text channels:** {text_channels}\n\
         **Voice channels:** {voice_channels}\n\
         **Boosts:** {}",
        guild.name,
        guild.id,
        guild.owner_id,
        guild.id.created_at().unix_timestamp(),
        guild.member_count,
        guild.premium_subscription_count,
    );
    respond_text(serenity_ctx, command, &info, false).await
}

const HELP_TEXT: &str = "**Sathi commands**\n\
`/ask <prompt>` - Ask KP baa anything (or say `oh kp baa <question>` in chat)\n\
`/play <query>` - Play a song or add it to the queue\n\
`/pause` `/resume` `/skip` `/stop` - Control playback\n\
`/queue` `/loop` `/shuffle` `/remove` `/clear` - Manage the queue\n\
`/volume <0-100>` - Set the volume\n\
`/leave` - Send me out of the voice channel\n\
`/confess <text>` - Anonymous confession\n\
`/date` `/serverinfo` `/ping` - Odds and ends\n\
`/announce` `/write` `/reload` - Operator commands\n\
\n\
I also reply when a message contains one of my trigger words!";
