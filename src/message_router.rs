//! Inbound message routing
//!
//! Every non-bot message lands here. In order: reaction for the special
//! user, the AI trigger-phrase path (questions and moderation directives),
//! then witty trigger words. Failures never escape; each one is converted
//! into a chat-visible reply by the event handler.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.0: Trigger-phrase AI queries and moderation directives
//! - 1.1.0: Special-user reactions
//! - 1.0.0: Witty trigger words

use anyhow::Result;
use log::{debug, error, info, warn};
use rand::seq::IndexedRandom;
use serenity::model::channel::{Message, ReactionType};
use serenity::prelude::Context;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::BotDataHandle;
use crate::features::ai::dispatcher::{AiDispatcher, AiSettings, Outcome};
use crate::features::ai::intent::{is_addressed, ModAction};
use crate::features::moderation;
use crate::features::witty::{self, MENTION_CHANCE, REACTION_CHANCE};

pub struct MessageRouter {
    bot_data: BotDataHandle,
    dispatcher: Arc<AiDispatcher>,
}

impl MessageRouter {
    pub fn new(bot_data: BotDataHandle, dispatcher: Arc<AiDispatcher>) -> Self {
        MessageRouter {
            bot_data,
            dispatcher,
        }
    }

    pub async fn handle_message(&self, ctx: &Context, msg: &Message) -> Result<()> {
        let data = self.bot_data.get().await;

        self.react_for_special_user(ctx, msg, &data.bot_config.samu_tag_reactions, data.bot_config.samu_user_id)
            .await;

        // The AI path owns any message that starts with the trigger phrase.
        if is_addressed(&msg.content, &data.bot_config.ai_trigger_phrase) {
            let settings = AiSettings::from(&data.bot_config);
            return self.handle_ai_message(ctx, msg, &settings).await;
        }

        self.handle_witty_triggers(ctx, msg, &data).await
    }

    async fn handle_ai_message(
        &self,
        ctx: &Context,
        msg: &Message,
        settings: &AiSettings,
    ) -> Result<()> {
        let is_privileged = self.is_privileged(ctx, msg).await;
        let outcome = self
            .dispatcher
            .dispatch(&msg.content, msg.author.id.0, is_privileged, settings)
            .await;

        match outcome {
            Outcome::Ignore => Ok(()),
            Outcome::Moderate {
                action,
                target_user_id,
                reason,
            } => {
                self.handle_moderation(ctx, msg, action, target_user_id, &reason)
                    .await
            }
            Outcome::Reply(chunks) => {
                let mut chunks = chunks.into_iter();
                if let Some(first) = chunks.next() {
                    msg.reply(&ctx.http, first).await?;
                }
                for chunk in chunks {
                    msg.channel_id.say(&ctx.http, chunk).await?;
                }
                Ok(())
            }
        }
    }

    async fn handle_moderation(
        &self,
        ctx: &Context,
        msg: &Message,
        action: ModAction,
        target_user_id: u64,
        reason: &str,
    ) -> Result<()> {
        let request_id = Uuid::new_v4();
        let Some(guild_id) = msg.guild_id else {
            msg.reply(&ctx.http, "Moderation only works inside a server.")
                .await?;
            return Ok(());
        };

        info!(
            "[{request_id}] Moderation directive | Actor: {} | Action: {} | Target: {target_user_id}",
            msg.author.id, action.as_str()
        );

        if !moderation::actor_may(ctx, guild_id, msg.author.id, action).await {
            warn!("[{request_id}] Actor lacks the capability, denying");
            msg.reply(&ctx.http, moderation::DENIAL_MESSAGE).await?;
            return Ok(());
        }

        match moderation::apply(ctx, guild_id, action, target_user_id, reason).await {
            Ok(done) => {
                msg.reply(&ctx.http, done).await?;
            }
            Err(e) => {
                error!("[{request_id}] Moderation action failed: {e:#}");
                msg.reply(
                    &ctx.http,
                    format!("Could not {} them. Check my role permissions.", action.as_str()),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn handle_witty_triggers(
        &self,
        ctx: &Context,
        msg: &Message,
        data: &crate::core::config::BotData,
    ) -> Result<()> {
        let matched = witty::find_trigger_words(&msg.content, &data.trigger_words());
        if matched.is_empty() {
            return Ok(());
        }

        let Some(response) = witty::pick_response(&data.witty_responses, &matched) else {
            return Ok(());
        };

        let response = if rand::random::<f64>() < MENTION_CHANCE {
            format!("<@{}> {response}", msg.author.id.0)
        } else {
            response
        };

        debug!("Witty response to '{}' from {}", matched[0], msg.author.id);
        msg.channel_id.say(&ctx.http, response).await?;

        if rand::random::<f64>() < REACTION_CHANCE {
            let emoji = data
                .bot_config
                .general_reactions
                .choose(&mut rand::rng())
                .cloned();
            if let Some(emoji) = emoji {
                if let Err(e) = msg.react(&ctx.http, ReactionType::Unicode(emoji)).await {
                    warn!("Reaction failed: {e}");
                }
            }
        }
        Ok(())
    }

    /// React when the special user is mentioned, but not in replies
    async fn react_for_special_user(
        &self,
        ctx: &Context,
        msg: &Message,
        reactions: &[String],
        special_user_id: u64,
    ) {
        if special_user_id == 0
            || msg.referenced_message.is_some()
            || !msg.mentions.iter().any(|u| u.id.0 == special_user_id)
        {
            return;
        }
        let Some(emoji) = reactions.choose(&mut rand::rng()).cloned() else {
            return;
        };
        if let Err(e) = msg.react(&ctx.http, ReactionType::Unicode(emoji)).await {
            warn!("Special-user reaction failed: {e}");
        }
    }

    /// Administrators are exempt from the query cooldown
    async fn is_privileged(&self, ctx: &Context, msg: &Message) -> bool {
        let Some(guild_id) = msg.guild_id else {
            return false;
        };
        moderation::actor_has(
            ctx,
            guild_id,
            msg.author.id,
            serenity::model::permissions::Permissions::ADMINISTRATOR,
        )
        .await
    }
}
