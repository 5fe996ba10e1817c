//! Music slash commands
//!
//! Handles: play, pause, resume, skip, stop, queue, volume, loop,
//! shuffle, remove, clear, leave
//!
//! Thin glue over [`Players`]: pull the options out, find the caller's
//! voice channel, run the player operation, turn the result (or the
//! error) into one chat-visible line.

use anyhow::Result;
use log::warn;
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::CommandOptionType;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::id::{GuildId, UserId};
use serenity::prelude::Context;
use std::fmt::Write as _;
use std::sync::Arc;

use super::{defer, edit_response, get_integer_option, get_string_option, respond_text, CommandContext};
use crate::core::response::truncate_for_message;
use crate::features::music::MusicError;

pub fn create_commands() -> Vec<CreateApplicationCommand> {
    let mut commands = vec![
        CreateApplicationCommand::default()
            .name("play")
            .description("Play a song or add it to the queue")
            .create_option(|option| {
                option
                    .name("query")
                    .description("A link or something to search for")
                    .kind(CommandOptionType::String)
                    .required(true)
            })
            .to_owned(),
        CreateApplicationCommand::default()
            .name("volume")
            .description("Set the playback volume")
            .create_option(|option| {
                option
                    .name("percent")
                    .description("0 to 100")
                    .kind(CommandOptionType::Integer)
                    .min_int_value(0)
                    .max_int_value(100)
                    .required(true)
            })
            .to_owned(),
        CreateApplicationCommand::default()
            .name("remove")
            .description("Remove one upcoming track from the queue")
            .create_option(|option| {
                option
                    .name("position")
                    .description("Position as shown by /queue")
                    .kind(CommandOptionType::Integer)
                    .min_int_value(1)
                    .required(true)
            })
            .to_owned(),
    ];

    let simple: [(&str, &str); 9] = [
        ("pause", "Pause playback"),
        ("resume", "Resume playback"),
        ("skip", "Skip the current track"),
        ("stop", "Stop playback and drop the queue"),
        ("queue", "Show what is playing and what is queued"),
        ("loop", "Toggle repeating the current track"),
        ("shuffle", "Shuffle the upcoming tracks"),
        ("clear", "Drop the upcoming tracks"),
        ("leave", "Leave the voice channel"),
    ];
    for (name, description) in simple {
        commands.push(
            CreateApplicationCommand::default()
                .name(name)
                .description(description)
                .to_owned(),
        );
    }
    commands
}

pub async fn handle(
    ctx: Arc<CommandContext>,
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond_text(serenity_ctx, command, "Music only works inside a server.", true)
            .await;
    };

    match command.data.name.as_str() {
        "play" => handle_play(ctx, serenity_ctx, command, guild_id).await,
        "queue" => handle_queue(ctx, serenity_ctx, command, guild_id).await,
        name => {
            let players = &ctx.players;
            let guild = guild_id.0;
            let reply = match name {
                "pause" => players.pause(guild).await.map(|_| "⏸️ Paused.".to_string()),
                "resume" => players
                    .resume(guild)
                    .await
                    .map(|_| "▶️ Resumed.".to_string()),
                "skip" => players
                    .skip(guild)
                    .await
                    .map(|title| format!("⏭️ Skipped **{title}**.")),
                "stop" => players
                    .stop(guild)
                    .await
                    .map(|_| "⏹️ Stopped and cleared the queue.".to_string()),
                "volume" => {
                    let percent = get_integer_option(&command.data.options, "percent")
                        .unwrap_or(-1);
                    if !(0..=100).contains(&percent) {
                        Err(MusicError::InvalidState("volume must be between 0 and 100"))
                    } else {
                        players
                            .set_volume(guild, percent as u8)
                            .await
                            .map(|_| format!("🔊 Volume set to {percent}%."))
                    }
                }
                "loop" => {
                    let enabled = players.toggle_loop(guild).await;
                    Ok(if enabled {
                        "🔁 Looping the current track.".to_string()
                    } else {
                        "➡️ Loop off.".to_string()
                    })
                }
                "shuffle" => players
                    .shuffle(guild)
                    .await
                    .map(|n| format!("🔀 Shuffled {n} tracks.")),
                "remove" => {
                    let position =
                        get_integer_option(&command.data.options, "position").unwrap_or(0);
                    if position < 1 {
                        Err(MusicError::InvalidState("no track at that position"))
                    } else {
                        players
                            .remove_at(guild, (position - 1) as usize)
                            .await
                            .map(|track| format!("🗑️ Removed **{}**.", track.title))
                    }
                }
                "clear" => players
                    .clear(guild)
                    .await
                    .map(|n| format!("🧹 Cleared {n} upcoming tracks.")),
                "leave" => players
                    .leave(guild)
                    .await
                    .map(|_| "👋 Left the voice channel.".to_string()),
                other => {
                    warn!("Unexpected music command: {other}");
                    return Ok(());
                }
            };

            match reply {
                Ok(text) => respond_text(serenity_ctx, command, &text, false).await,
                Err(e) => respond_text(serenity_ctx, command, &format!("❌ {e}"), true).await,
            }
        }
    }
}

async fn handle_play(
    ctx: Arc<CommandContext>,
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
    guild_id: GuildId,
) -> Result<()> {
    let query = get_string_option(&command.data.options, "query")
        .ok_or_else(|| anyhow::anyhow!("missing query option"))?;

    let Some(voice_channel_id) = user_voice_channel(serenity_ctx, guild_id, command.user.id)
    else {
        return respond_text(
            serenity_ctx,
            command,
            "Join a voice channel first, then ask me to play.",
            true,
        )
        .await;
    };

    // Resolution shells out and can take several seconds.
    defer(serenity_ctx, command).await?;

    let result = ctx
        .players
        .enqueue_from_query(
            guild_id.0,
            voice_channel_id,
            command.channel_id.0,
            &query,
        )
        .await;

    match result {
        Ok(titles) if titles.len() == 1 => {
            edit_response(serenity_ctx, command, &format!("🎵 Queued **{}**.", titles[0])).await
        }
        Ok(titles) => {
            edit_response(
                serenity_ctx,
                command,
                &format!("🎵 Queued {} tracks.", titles.len()),
            )
            .await
        }
        Err(e) => edit_response(serenity_ctx, command, &format!("❌ {e}")).await,
    }
}

async fn handle_queue(
    ctx: Arc<CommandContext>,
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
    guild_id: GuildId,
) -> Result<()> {
    let Some(snapshot) = ctx.players.snapshot(guild_id.0).await else {
        return respond_text(serenity_ctx, command, "The queue is empty.", false).await;
    };

    let mut text = String::new();
    match &snapshot.current {
        Some(track) => {
            let _ = writeln!(
                text,
                "🎶 Now playing: **{}** [{}]",
                track.title,
                track.duration_display()
            );
        }
        None => {
            let _ = writeln!(text, "Nothing is playing.");
        }
    }

    if snapshot.upcoming.is_empty() {
        let _ = writeln!(text, "The queue is empty.");
    } else {
        let _ = writeln!(text, "Up next:");
        for (i, track) in snapshot.upcoming.iter().enumerate() {
            let _ = writeln!(
                text,
                "{}. **{}** [{}]",
                i + 1,
                track.title,
                track.duration_display()
            );
        }
    }
    let _ = write!(
        text,
        "Loop: {} | Volume: {}%",
        if snapshot.loop_enabled { "on" } else { "off" },
        snapshot.volume_percent
    );

    respond_text(serenity_ctx, command, &truncate_for_message(&text), false).await
}

/// The voice channel the user is currently in, from the gateway cache
fn user_voice_channel(
    serenity_ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Option<u64> {
    let guild = serenity_ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|state| state.channel_id)
        .map(|channel| channel.0)
}
