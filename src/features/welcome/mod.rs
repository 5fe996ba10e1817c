//! # Welcome Feature
//!
//! Greets new members with a random configured template. The greeting
//! goes to the configured welcome channel, falling back to a channel with
//! a conventional name, then to the guild's first text channel.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: true

use rand::seq::IndexedRandom;
use serenity::model::channel::ChannelType;
use serenity::model::guild::Guild;
use serenity::model::id::ChannelId;

/// Channel names considered a reasonable home for greetings
const FALLBACK_CHANNEL_NAMES: [&str; 4] = ["welcome", "general", "main", "lobby"];

/// Random template with `{user}` replaced by the member mention
pub fn render_welcome(templates: &[String], mention: &str) -> String {
    let mut rng = rand::rng();
    let template = templates
        .choose(&mut rng)
        .map(String::as_str)
        .unwrap_or("Welcome {user}!");
    template.replace("{user}", mention)
}

pub fn is_welcome_candidate(channel_name: &str) -> bool {
    FALLBACK_CHANNEL_NAMES.contains(&channel_name.to_lowercase().as_str())
}

/// Where the greeting should go: the configured channel when it exists in
/// this guild, else a conventionally named channel, else the first text
/// channel by position.
pub fn pick_welcome_channel(guild: &Guild, configured_channel_id: u64) -> Option<ChannelId> {
    if configured_channel_id != 0 {
        let configured = ChannelId(configured_channel_id);
        if guild.channels.contains_key(&configured) {
            return Some(configured);
        }
    }

    let mut text_channels: Vec<_> = guild
        .channels
        .values()
        .filter_map(|channel| channel.clone().guild())
        .filter(|channel| channel.kind == ChannelType::Text)
        .collect();
    text_channels.sort_by_key(|channel| channel.position);

    text_channels
        .iter()
        .find(|channel| is_welcome_candidate(&channel.name))
        .or_else(|| text_channels.first())
        .map(|channel| channel.id)
}
