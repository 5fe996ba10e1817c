//! Admin and relay commands
//!
//! Handles: announce, write, reload, confess
//!
//! `/announce` and `/write` relay a message into the general channel on
//! behalf of one configured operator, optionally expanding `@<id>` tokens
//! into real mentions. `/reload` re-reads `bot_data.json`. `/confess`
//! relays anonymously into the configured confession channel.

use anyhow::Result;
use log::{info, warn};
use regex::Regex;
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::channel::ChannelType;
use serenity::model::id::ChannelId;
use serenity::prelude::Context;
use std::sync::Arc;
use std::sync::OnceLock;

use super::{get_string_option, is_admin, respond_text, CommandContext};

pub fn create_commands() -> Vec<CreateApplicationCommand> {
    vec![
        CreateApplicationCommand::default()
            .name("announce")
            .description("Send an announcement with @everyone (authorized users only)")
            .create_option(|option| {
                option
                    .name("message")
                    .description("The announcement text; @<user id> becomes a mention")
                    .kind(CommandOptionType::String)
                    .required(true)
            })
            .to_owned(),
        CreateApplicationCommand::default()
            .name("write")
            .description("Send a message to the general channel (authorized users only)")
            .create_option(|option| {
                option
                    .name("message")
                    .description("The message text; @<user id> becomes a mention")
                    .kind(CommandOptionType::String)
                    .required(true)
            })
            .to_owned(),
        CreateApplicationCommand::default()
            .name("reload")
            .description("Reload bot_data.json (administrators only)")
            .to_owned(),
        CreateApplicationCommand::default()
            .name("confess")
            .description("Send an anonymous confession")
            .create_option(|option| {
                option
                    .name("text")
                    .description("What would you like to confess?")
                    .kind(CommandOptionType::String)
                    .required(true)
            })
            .to_owned(),
    ]
}

pub async fn handle(
    ctx: Arc<CommandContext>,
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<()> {
    match command.data.name.as_str() {
        "announce" => handle_relay(ctx, serenity_ctx, command, true).await,
        "write" => handle_relay(ctx, serenity_ctx, command, false).await,
        "reload" => handle_reload(ctx, serenity_ctx, command).await,
        "confess" => handle_confess(ctx, serenity_ctx, command).await,
        _ => Ok(()),
    }
}

/// `@123456789` → `<@123456789>` so operators can paste raw ids
fn expand_mentions(message: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"@(\d+)").unwrap());
    re.replace_all(message, "<@$1>").into_owned()
}

async fn handle_relay(
    ctx: Arc<CommandContext>,
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
    with_everyone: bool,
) -> Result<()> {
    let data = ctx.bot_data.get().await;
    let config = &data.bot_config;

    if config.write_command_user_id == 0 || command.user.id.0 != config.write_command_user_id {
        warn!(
            "Unauthorized /{} attempt by {}",
            command.data.name, command.user.id
        );
        return respond_text(
            serenity_ctx,
            command,
            "❌ Access denied: you are not authorized to use this command.",
            true,
        )
        .await;
    }

    if config.write_command_channel_id != 0
        && command.channel_id.0 != config.write_command_channel_id
    {
        return respond_text(
            serenity_ctx,
            command,
            &format!(
                "❌ Wrong channel: use this command in <#{}>.",
                config.write_command_channel_id
            ),
            true,
        )
        .await;
    }

    let Some(target) = find_general_channel(serenity_ctx, command, config.general_channel_id)
    else {
        return respond_text(serenity_ctx, command, "❌ Could not find a target channel.", true)
            .await;
    };

    let message = get_string_option(&command.data.options, "message")
        .ok_or_else(|| anyhow::anyhow!("missing message option"))?;
    let mut text = expand_mentions(&message);
    if with_everyone {
        text = format!("@everyone {text}");
    }

    target.say(&serenity_ctx.http, &text).await?;
    info!(
        "Relay /{} by {} into channel {target}: {}",
        command.data.name,
        command.user.id,
        text.chars().take(50).collect::<String>()
    );
    respond_text(serenity_ctx, command, "✅ Sent.", true).await
}

/// The configured general channel, else the first channel whose name
/// contains "general"
fn find_general_channel(
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
    configured: u64,
) -> Option<ChannelId> {
    if configured != 0 {
        return Some(ChannelId(configured));
    }
    let guild = serenity_ctx.cache.guild(command.guild_id?)?;
    guild
        .channels
        .values()
        .filter_map(|channel| channel.clone().guild())
        .filter(|channel| channel.kind == ChannelType::Text)
        .find(|channel| channel.name.to_lowercase().contains("general"))
        .map(|channel| channel.id)
}

async fn handle_reload(
    ctx: Arc<CommandContext>,
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<()> {
    if !is_admin(command) {
        return respond_text(
            serenity_ctx,
            command,
            "❌ Only administrators can reload the configuration.",
            true,
        )
        .await;
    }

    match ctx.bot_data.reload().await {
        Ok((triggers, welcomes)) => {
            respond_text(
                serenity_ctx,
                command,
                &format!(
                    "✅ Data reloaded: {triggers} trigger categories, {welcomes} welcome messages."
                ),
                false,
            )
            .await
        }
        Err(e) => {
            warn!("Reload failed: {e:#}");
            respond_text(serenity_ctx, command, &format!("❌ Reload failed: {e}"), true).await
        }
    }
}

async fn handle_confess(
    ctx: Arc<CommandContext>,
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<()> {
    let data = ctx.bot_data.get().await;
    let channel_id = data.bot_config.confession_channel_id;
    if channel_id == 0 {
        return respond_text(
            serenity_ctx,
            command,
            "❌ No confession channel is configured.",
            true,
        )
        .await;
    }

    let text = get_string_option(&command.data.options, "text")
        .ok_or_else(|| anyhow::anyhow!("missing text option"))?;

    ChannelId(channel_id)
        .say(&serenity_ctx.http, format!("🤫 **Anonymous confession:** {text}"))
        .await?;
    // Deliberately not logging who confessed.
    respond_text(serenity_ctx, command, "✅ Your secret is safe.", true).await
}
