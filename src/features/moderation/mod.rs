//! # Moderation Feature
//!
//! Applies the kick/ban/mute/unmute directives produced by the intent
//! classifier. The caller checks the actor's capability first; this
//! module maps each action to the permission it requires and performs the
//! platform call. "Mute" is a one-hour member timeout.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.6.0
//! - **Toggleable**: false

use anyhow::{Context as AnyhowContext, Result};
use log::info;
use serenity::model::id::{GuildId, UserId};
use serenity::model::permissions::Permissions;
use serenity::model::Timestamp;
use serenity::prelude::Context;

use crate::features::ai::intent::ModAction;

pub const DENIAL_MESSAGE: &str = "You do not have the permission for that, babu.";

const MUTE_SECONDS: i64 = 3600;

/// The guild permission an actor needs for each action
pub fn required_permission(action: ModAction) -> Permissions {
    match action {
        ModAction::Kick => Permissions::KICK_MEMBERS,
        ModAction::Ban => Permissions::BAN_MEMBERS,
        ModAction::Mute | ModAction::Unmute => Permissions::MODERATE_MEMBERS,
    }
}

/// Confirmation line shown after a successful action
pub fn confirmation(action: ModAction, target_user_id: u64, reason: &str) -> String {
    let verb = match action {
        ModAction::Kick => "Kicked",
        ModAction::Ban => "Banned",
        ModAction::Mute => "Muted",
        ModAction::Unmute => "Unmuted",
    };
    format!("{verb} <@{target_user_id}> ({reason})")
}

/// Whether the actor holds the capability for this action. The guild
/// owner and administrators always qualify; lookup failures deny.
pub async fn actor_may(
    ctx: &Context,
    guild_id: GuildId,
    actor_id: UserId,
    action: ModAction,
) -> bool {
    actor_has(ctx, guild_id, actor_id, required_permission(action)).await
}

/// Guild-level permission check from the cached role set
pub async fn actor_has(
    ctx: &Context,
    guild_id: GuildId,
    actor_id: UserId,
    required: Permissions,
) -> bool {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return false;
    };
    if guild.owner_id == actor_id {
        return true;
    }
    let Ok(member) = guild_id.member(&ctx.http, actor_id).await else {
        return false;
    };

    // The @everyone role is keyed by the guild id and not listed on the
    // member, so it is checked alongside the member's own roles.
    let everyone = serenity::model::id::RoleId(guild_id.0);
    member
        .roles
        .iter()
        .chain(std::iter::once(&everyone))
        .filter_map(|role_id| guild.roles.get(role_id))
        .any(|role| {
            role.permissions.administrator() || role.permissions.contains(required)
        })
}

/// Perform the action against the target, returning the confirmation text
pub async fn apply(
    ctx: &Context,
    guild_id: GuildId,
    action: ModAction,
    target_user_id: u64,
    reason: &str,
) -> Result<String> {
    let target = UserId(target_user_id);
    match action {
        ModAction::Kick => {
            guild_id
                .kick_with_reason(&ctx.http, target, reason)
                .await
                .context("kick failed")?;
        }
        ModAction::Ban => {
            guild_id
                .ban_with_reason(&ctx.http, target, 0, reason)
                .await
                .context("ban failed")?;
        }
        ModAction::Mute => {
            let until = Timestamp::from_unix_timestamp(
                chrono::Utc::now().timestamp() + MUTE_SECONDS,
            )
            .context("timeout timestamp out of range")?;
            let mut member = guild_id.member(&ctx.http, target).await?;
            member
                .disable_communication_until_datetime(&ctx.http, until)
                .await
                .context("mute failed")?;
        }
        ModAction::Unmute => {
            let mut member = guild_id.member(&ctx.http, target).await?;
            member
                .enable_communication(&ctx.http)
                .await
                .context("unmute failed")?;
        }
    }

    info!(
        "Applied {} to user {target_user_id} in guild {guild_id} ({reason})",
        action.as_str()
    );
    Ok(confirmation(action, target_user_id, reason))
}
