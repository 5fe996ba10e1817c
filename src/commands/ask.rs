//! /ask: the slash-command doorway into the AI dispatcher
//!
//! Goes through exactly the same pipeline as a trigger-phrase message, so
//! the cooldown, the length limit and even the moderation-directive
//! detection behave identically in both places.

use anyhow::Result;
use log::{error, info};
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::prelude::Context;
use std::sync::Arc;

use super::{defer, edit_response, get_string_option, CommandContext};
use crate::features::ai::dispatcher::{AiSettings, Outcome};
use crate::features::moderation;

pub fn create_commands() -> Vec<CreateApplicationCommand> {
    vec![CreateApplicationCommand::default()
        .name("ask")
        .description("Ask KP baa a question")
        .create_option(|option| {
            option
                .name("prompt")
                .description("What do you want to know?")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .to_owned()]
}

pub async fn handle(
    ctx: Arc<CommandContext>,
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<()> {
    let prompt = get_string_option(&command.data.options, "prompt")
        .ok_or_else(|| anyhow::anyhow!("missing prompt option"))?;

    let data = ctx.bot_data.get().await;
    let settings = AiSettings::from(&data.bot_config);
    let is_privileged = super::is_admin(command);

    // The model call can take a while; claim the interaction first.
    defer(serenity_ctx, command).await?;

    let text = format!("{} {prompt}", settings.trigger_phrase);
    let outcome = ctx
        .dispatcher
        .dispatch(&text, command.user.id.0, is_privileged, &settings)
        .await;

    match outcome {
        Outcome::Ignore => {
            // Cannot happen for a prefixed prompt, but never leave the
            // interaction hanging.
            edit_response(serenity_ctx, command, "Hmm, I have nothing to say.").await
        }
        Outcome::Moderate {
            action,
            target_user_id,
            reason,
        } => {
            let Some(guild_id) = command.guild_id else {
                return edit_response(
                    serenity_ctx,
                    command,
                    "Moderation only works inside a server.",
                )
                .await;
            };

            let allowed = command
                .member
                .as_ref()
                .and_then(|m| m.permissions)
                .map(|p| p.administrator() || p.contains(moderation::required_permission(action)))
                .unwrap_or(false);
            if !allowed {
                return edit_response(serenity_ctx, command, moderation::DENIAL_MESSAGE).await;
            }

            match moderation::apply(serenity_ctx, guild_id, action, target_user_id, &reason).await
            {
                Ok(done) => edit_response(serenity_ctx, command, &done).await,
                Err(e) => {
                    error!("/ask moderation failed: {e:#}");
                    edit_response(
                        serenity_ctx,
                        command,
                        &format!(
                            "Could not {} them. Check my role permissions.",
                            action.as_str()
                        ),
                    )
                    .await
                }
            }
        }
        Outcome::Reply(chunks) => {
            let mut chunks = chunks.into_iter();
            if let Some(first) = chunks.next() {
                edit_response(serenity_ctx, command, &first).await?;
            }
            for chunk in chunks {
                command
                    .create_followup_message(&serenity_ctx.http, |message| {
                        message.content(chunk)
                    })
                    .await?;
            }
            info!("/ask answered for user {}", command.user.id);
            Ok(())
        }
    }
}
