//! Audio transport seam
//!
//! The player state machine drives the voice connection through
//! [`AudioTransport`] and hears back through [`PlayerEvent`]s on a
//! channel: one event per track completion (natural, skipped, or failed)
//! and one per driver disconnect. Everything the state machine decides is
//! therefore testable with a fake transport; the songbird-backed
//! implementation lives here too.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use log::{debug, error, warn};
use serenity::model::id::{ChannelId, GuildId};
use songbird::tracks::TrackHandle;
use songbird::{CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I am not in a voice channel")]
    NotConnected,
    #[error("could not join the voice channel: {0}")]
    JoinFailed(String),
    #[error("could not start the stream: {0}")]
    StartFailed(String),
    #[error("no track is active")]
    NothingPlaying,
    #[error("transport control failed: {0}")]
    Control(String),
}

/// Signals delivered from the transport back into the player's single
/// event loop. Track completion is reported exactly once per started
/// track, whether it ended naturally, was stopped, or died with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    TrackEnded {
        guild_id: u64,
        error: Option<String>,
    },
    Disconnected {
        guild_id: u64,
    },
}

#[async_trait]
pub trait AudioTransport: Send + Sync {
    async fn join(&self, guild_id: u64, channel_id: u64) -> Result<(), TransportError>;
    async fn leave(&self, guild_id: u64) -> Result<(), TransportError>;
    fn is_connected(&self, guild_id: u64) -> bool;

    /// Start streaming `stream_url`. Completion (or failure after a
    /// successful start) arrives later as a [`PlayerEvent::TrackEnded`].
    async fn play(&self, guild_id: u64, stream_url: &str, volume: f32)
        -> Result<(), TransportError>;
    async fn pause(&self, guild_id: u64) -> Result<(), TransportError>;
    async fn resume(&self, guild_id: u64) -> Result<(), TransportError>;
    /// Stop the active track. This fires the track-ended event.
    async fn stop(&self, guild_id: u64) -> Result<(), TransportError>;
    async fn set_volume(&self, guild_id: u64, volume: f32) -> Result<(), TransportError>;
}

/// Songbird-backed transport
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    events: UnboundedSender<PlayerEvent>,
    handles: DashMap<u64, TrackHandle>,
    watched_guilds: DashSet<u64>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, events: UnboundedSender<PlayerEvent>) -> Self {
        SongbirdTransport {
            manager,
            events,
            handles: DashMap::new(),
            watched_guilds: DashSet::new(),
        }
    }

    fn handle_for(&self, guild_id: u64) -> Result<TrackHandle, TransportError> {
        self.handles
            .get(&guild_id)
            .map(|h| h.value().clone())
            .ok_or(TransportError::NothingPlaying)
    }
}

#[async_trait]
impl AudioTransport for SongbirdTransport {
    async fn join(&self, guild_id: u64, channel_id: u64) -> Result<(), TransportError> {
        let (call, result) = self
            .manager
            .join(GuildId(guild_id), ChannelId(channel_id))
            .await;
        result.map_err(|e| TransportError::JoinFailed(e.to_string()))?;

        // One disconnect watcher per guild, however many times we rejoin.
        if self.watched_guilds.insert(guild_id) {
            call.lock().await.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectNotifier {
                    guild_id,
                    events: self.events.clone(),
                },
            );
        }

        debug!("Joined voice channel {channel_id} in guild {guild_id}");
        Ok(())
    }

    async fn leave(&self, guild_id: u64) -> Result<(), TransportError> {
        self.handles.remove(&guild_id);
        self.manager
            .remove(GuildId(guild_id))
            .await
            .map_err(|e| TransportError::Control(e.to_string()))
    }

    fn is_connected(&self, guild_id: u64) -> bool {
        self.manager.get(GuildId(guild_id)).is_some()
    }

    async fn play(
        &self,
        guild_id: u64,
        stream_url: &str,
        volume: f32,
    ) -> Result<(), TransportError> {
        let call = self
            .manager
            .get(GuildId(guild_id))
            .ok_or(TransportError::NotConnected)?;

        let input = songbird::input::ffmpeg(stream_url)
            .await
            .map_err(|e| TransportError::StartFailed(format!("{e:?}")))?;

        let (track, handle) = songbird::tracks::create_player(input);
        if let Err(e) = handle.set_volume(volume) {
            warn!("Could not set initial volume in guild {guild_id}: {e:?}");
        }
        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    guild_id,
                    events: self.events.clone(),
                },
            )
            .map_err(|e| TransportError::StartFailed(format!("{e:?}")))?;

        call.lock().await.play(track);
        self.handles.insert(guild_id, handle);
        Ok(())
    }

    async fn pause(&self, guild_id: u64) -> Result<(), TransportError> {
        self.handle_for(guild_id)?
            .pause()
            .map_err(|e| TransportError::Control(format!("{e:?}")))
    }

    async fn resume(&self, guild_id: u64) -> Result<(), TransportError> {
        self.handle_for(guild_id)?
            .play()
            .map_err(|e| TransportError::Control(format!("{e:?}")))
    }

    async fn stop(&self, guild_id: u64) -> Result<(), TransportError> {
        self.handle_for(guild_id)?
            .stop()
            .map_err(|e| TransportError::Control(format!("{e:?}")))
    }

    async fn set_volume(&self, guild_id: u64, volume: f32) -> Result<(), TransportError> {
        self.handle_for(guild_id)?
            .set_volume(volume)
            .map_err(|e| TransportError::Control(format!("{e:?}")))
    }
}

struct TrackEndNotifier {
    guild_id: u64,
    events: UnboundedSender<PlayerEvent>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(_) = ctx {
            debug!("Track ended in guild {}", self.guild_id);
            if let Err(e) = self.events.send(PlayerEvent::TrackEnded {
                guild_id: self.guild_id,
                error: None,
            }) {
                error!("Player event loop is gone: {e}");
            }
        }
        None
    }
}

struct DisconnectNotifier {
    guild_id: u64,
    events: UnboundedSender<PlayerEvent>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(_) = ctx {
            warn!("Voice driver disconnected in guild {}", self.guild_id);
            let _ = self.events.send(PlayerEvent::Disconnected {
                guild_id: self.guild_id,
            });
        }
        None
    }
}
