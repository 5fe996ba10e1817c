//! # Command System
//!
//! Slash command definitions, registration and dispatch.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Music and AI command groups
//! - 1.0.0: Initial slash-only command surface

pub mod admin;
pub mod ask;
pub mod context;
pub mod info;
pub mod music;

pub use context::CommandContext;

use anyhow::Result;
use log::{info, warn};
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::Command;
use serenity::model::application::interaction::application_command::{
    ApplicationCommandInteraction, CommandDataOption,
};
use serenity::model::application::interaction::InteractionResponseType;
use serenity::model::id::GuildId;
use serenity::prelude::Context;
use std::sync::Arc;

/// All slash command definitions
pub fn create_slash_commands() -> Vec<CreateApplicationCommand> {
    let mut commands = Vec::new();
    commands.extend(info::create_commands());
    commands.extend(ask::create_commands());
    commands.extend(music::create_commands());
    commands.extend(admin::create_commands());
    commands
}

/// Register all commands globally (may take up to an hour to propagate)
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    let definitions = create_slash_commands();
    let count = definitions.len();

    Command::set_global_application_commands(&ctx.http, |commands| {
        for definition in definitions {
            commands.add_application_command(definition);
        }
        commands
    })
    .await?;

    info!("Registered {count} global slash commands");
    Ok(())
}

/// Register all commands for one guild (instant; used in development)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    let definitions = create_slash_commands();
    let count = definitions.len();

    guild_id
        .set_application_commands(&ctx.http, |commands| {
            for definition in definitions {
                commands.add_application_command(definition);
            }
            commands
        })
        .await?;

    info!("Registered {count} slash commands for guild {guild_id}");
    Ok(())
}

/// Dispatch one slash command interaction by name
pub async fn handle_slash_command(
    ctx: Arc<CommandContext>,
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<()> {
    info!(
        "Slash command /{} from user {}",
        command.data.name, command.user.id
    );

    match command.data.name.as_str() {
        "ask" => ask::handle(ctx, serenity_ctx, command).await,
        "play" | "pause" | "resume" | "skip" | "stop" | "queue" | "volume" | "loop"
        | "shuffle" | "remove" | "clear" | "leave" => {
            music::handle(ctx, serenity_ctx, command).await
        }
        "announce" | "write" | "reload" | "confess" => {
            admin::handle(ctx, serenity_ctx, command).await
        }
        "ping" | "serverinfo" | "date" | "help" => info::handle(ctx, serenity_ctx, command).await,
        other => {
            warn!("Unknown slash command: {other}");
            respond_text(serenity_ctx, command, "I do not know that command.", true).await
        }
    }
}

/// Immediate plain-text response to an interaction
pub async fn respond_text(
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_interaction_response(&serenity_ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| {
                    message.content(content);
                    if ephemeral {
                        message.ephemeral(true);
                    }
                    message
                })
        })
        .await?;
    Ok(())
}

/// Defer the response; required before anything that can take seconds
pub async fn defer(
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<()> {
    command
        .create_interaction_response(&serenity_ctx.http, |response| {
            response.kind(InteractionResponseType::DeferredChannelMessageWithSource)
        })
        .await?;
    Ok(())
}

/// Replace a deferred response with plain text
pub async fn edit_response(
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: &str,
) -> Result<()> {
    command
        .edit_original_interaction_response(&serenity_ctx.http, |response| {
            response.content(content)
        })
        .await?;
    Ok(())
}

/// Utility function to get string option from slash command
pub fn get_string_option(options: &[CommandDataOption], name: &str) -> Option<String> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_ref())
        .and_then(|val| val.as_str())
        .map(|s| s.to_string())
}

/// Utility function to get integer option from slash command
pub fn get_integer_option(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_ref())
        .and_then(|val| val.as_i64())
}

/// Whether the invoking member is a guild administrator
pub fn is_admin(command: &ApplicationCommandInteraction) -> bool {
    command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .map(|permissions| permissions.administrator())
        .unwrap_or(false)
}
