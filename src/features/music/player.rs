//! Per-guild player state machine
//!
//! Owns the playback queues and drives the resolve → stream → play →
//! completion → advance loop. Each guild has one session behind an async
//! mutex, so queue transitions are serialized per guild; the only path
//! that advances playback after a track has started is the completion
//! event handled by [`Players::on_track_ended`], which makes a skip and a
//! natural ending indistinguishable and rules out double advances.
//!
//! Start failures are retried a bounded number of times with a fresh
//! stream URL on every retry, then the queue moves on to the next track:
//! a single dead track never stalls the player.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.8.0
//!
//! ## Changelog
//! - 1.2.0: One-shot reconnect on driver disconnect
//! - 1.1.0: Re-resolve stream URLs on retry
//! - 1.0.0: Initial queue-driven playback

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use serenity::http::Http;
use serenity::model::id::ChannelId;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::queue::PlaybackQueue;
use super::resolver::{ResolveError, TrackResolver};
use super::track::{TrackDescriptor, TrackQuery};
use super::transport::{AudioTransport, PlayerEvent, TransportError};

#[derive(Debug, Error)]
pub enum MusicError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{0}")]
    InvalidState(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Resolving,
    Playing,
    Paused,
    Stopped,
}

/// Everything the player knows about one guild
struct PlayerSession {
    guild_id: u64,
    queue: PlaybackQueue,
    state: PlayerState,
    /// Last voice channel we were asked into; reconnect target
    voice_channel_id: u64,
    /// Text channel of the latest play command; failure reports go here
    text_channel_id: u64,
}

impl PlayerSession {
    fn new(guild_id: u64) -> Self {
        PlayerSession {
            guild_id,
            queue: PlaybackQueue::new(),
            state: PlayerState::Idle,
            voice_channel_id: 0,
            text_channel_id: 0,
        }
    }
}

/// Read-only view of a session for the `/queue` command
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<TrackDescriptor>,
    pub upcoming: Vec<TrackDescriptor>,
    pub loop_enabled: bool,
    pub volume_percent: u8,
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub max_start_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            max_start_attempts: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Sends player notices ("now playing", failure reports) to a text channel
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, channel_id: u64, message: &str);
}

/// Serenity-backed [`Announcer`]
pub struct HttpAnnouncer {
    http: Arc<Http>,
}

impl HttpAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        HttpAnnouncer { http }
    }
}

#[async_trait]
impl Announcer for HttpAnnouncer {
    async fn announce(&self, channel_id: u64, message: &str) {
        if channel_id == 0 {
            return;
        }
        if let Err(e) = ChannelId(channel_id).say(&self.http, message).await {
            error!("Failed to send player notice to channel {channel_id}: {e}");
        }
    }
}

/// All per-guild players, plus the collaborators they share
pub struct Players {
    sessions: DashMap<u64, Arc<Mutex<PlayerSession>>>,
    resolver: Arc<dyn TrackResolver>,
    transport: Arc<dyn AudioTransport>,
    announcer: Arc<dyn Announcer>,
    config: PlayerConfig,
}

impl Players {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        transport: Arc<dyn AudioTransport>,
        announcer: Arc<dyn Announcer>,
        config: PlayerConfig,
    ) -> Self {
        Players {
            sessions: DashMap::new(),
            resolver,
            transport,
            announcer,
            config,
        }
    }

    /// Session for a guild, created lazily on first use
    fn session(&self, guild_id: u64) -> Arc<Mutex<PlayerSession>> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(PlayerSession::new(guild_id))))
            .value()
            .clone()
    }

    fn existing(&self, guild_id: u64) -> Option<Arc<Mutex<PlayerSession>>> {
        self.sessions.get(&guild_id).map(|s| s.value().clone())
    }

    /// Resolve a query and append the result to the guild's queue, joining
    /// the caller's voice channel and starting playback if the player was
    /// idle. Nothing is mutated when resolution fails. Returns the titles
    /// added, in order.
    pub async fn enqueue_from_query(
        &self,
        guild_id: u64,
        voice_channel_id: u64,
        text_channel_id: u64,
        input: &str,
    ) -> Result<Vec<String>, MusicError> {
        let query = TrackQuery::from_input(input);
        let tracks = self.resolver.resolve(&query).await?;
        let titles: Vec<String> = tracks.iter().map(|t| t.title.clone()).collect();

        let session = self.session(guild_id);
        let mut session = session.lock().await;
        session.voice_channel_id = voice_channel_id;
        session.text_channel_id = text_channel_id;

        if !self.transport.is_connected(guild_id) {
            self.transport.join(guild_id, voice_channel_id).await?;
        }

        for track in tracks {
            session.queue.enqueue(track);
        }
        info!(
            "Queued {} track(s) in guild {guild_id} ({} waiting)",
            titles.len(),
            session.queue.len()
        );

        if matches!(session.state, PlayerState::Idle | PlayerState::Stopped) {
            self.play_next(&mut session).await;
        }

        Ok(titles)
    }

    /// The single completion entry point: every track that was started
    /// produces exactly one call here, whether it finished, errored, or
    /// was stopped by a skip.
    pub async fn on_track_ended(&self, guild_id: u64, error: Option<String>) {
        let Some(session) = self.existing(guild_id) else {
            return;
        };
        let mut session = session.lock().await;
        if let Some(e) = error {
            warn!("Track in guild {guild_id} ended with error: {e}");
        }
        self.play_next(&mut session).await;
    }

    /// Driver disconnect with work remaining gets one reconnect attempt to
    /// the last-known channel; anything else goes quietly idle.
    pub async fn on_disconnected(&self, guild_id: u64) {
        let Some(session) = self.existing(guild_id) else {
            return;
        };
        let mut session = session.lock().await;

        let has_work = session.queue.current().is_some() || !session.queue.is_empty();
        if !has_work {
            session.state = PlayerState::Idle;
            return;
        }

        warn!(
            "Voice disconnect in guild {guild_id} with work remaining, attempting one reconnect"
        );
        match self
            .transport
            .join(guild_id, session.voice_channel_id)
            .await
        {
            Ok(()) => {
                info!("Reconnected to voice in guild {guild_id}");
                // The stream died with the connection; restart the
                // interrupted track from the top with a fresh URL.
                if let Some(track) = session.queue.current().cloned() {
                    let volume = session.queue.volume();
                    match self.start_track(guild_id, &track, volume).await {
                        Ok(()) => session.state = PlayerState::Playing,
                        Err(e) => {
                            warn!("Could not restart '{}' after reconnect: {e}", track.title);
                            self.report(&session, &format!(
                                "⚠️ Could not restart **{}** after a reconnect, moving on.",
                                track.title
                            ))
                            .await;
                            session.queue.take_current();
                            self.play_next(&mut session).await;
                        }
                    }
                } else {
                    self.play_next(&mut session).await;
                }
            }
            Err(e) => {
                error!("Reconnect failed in guild {guild_id}: {e}");
                self.report(
                    &session,
                    "⚠️ Lost the voice connection and could not get it back.",
                )
                .await;
                session.queue.take_current();
                session.state = PlayerState::Idle;
            }
        }
    }

    pub async fn pause(&self, guild_id: u64) -> Result<(), MusicError> {
        let session = self
            .existing(guild_id)
            .ok_or(MusicError::InvalidState("nothing is playing"))?;
        let mut session = session.lock().await;
        if session.state != PlayerState::Playing {
            return Err(MusicError::InvalidState("nothing is playing"));
        }
        self.transport.pause(guild_id).await?;
        session.state = PlayerState::Paused;
        Ok(())
    }

    pub async fn resume(&self, guild_id: u64) -> Result<(), MusicError> {
        let session = self
            .existing(guild_id)
            .ok_or(MusicError::InvalidState("playback is not paused"))?;
        let mut session = session.lock().await;
        if session.state != PlayerState::Paused {
            return Err(MusicError::InvalidState("playback is not paused"));
        }
        self.transport.resume(guild_id).await?;
        session.state = PlayerState::Playing;
        Ok(())
    }

    /// Force-stop the active track. The resulting completion event does
    /// the actual advancing, exactly like a natural ending.
    pub async fn skip(&self, guild_id: u64) -> Result<String, MusicError> {
        let session = self
            .existing(guild_id)
            .ok_or(MusicError::InvalidState("no track is active"))?;
        let session = session.lock().await;
        if !matches!(session.state, PlayerState::Playing | PlayerState::Paused) {
            return Err(MusicError::InvalidState("no track is active"));
        }
        let title = session
            .queue
            .current()
            .map(|t| t.title.clone())
            .unwrap_or_default();
        self.transport.stop(guild_id).await?;
        Ok(title)
    }

    /// Drop the whole queue and stop the transport
    pub async fn stop(&self, guild_id: u64) -> Result<(), MusicError> {
        let session = self
            .existing(guild_id)
            .ok_or(MusicError::InvalidState("nothing to stop"))?;
        let mut session = session.lock().await;

        session.queue.clear();
        if matches!(session.state, PlayerState::Playing | PlayerState::Paused) {
            session.state = PlayerState::Stopped;
            // The completion event finds an empty queue and parks us idle.
            self.transport.stop(guild_id).await?;
        } else {
            session.state = PlayerState::Idle;
        }
        Ok(())
    }

    pub async fn toggle_loop(&self, guild_id: u64) -> bool {
        let session = self.session(guild_id);
        let mut session = session.lock().await;
        session.queue.toggle_loop()
    }

    pub async fn shuffle(&self, guild_id: u64) -> Result<usize, MusicError> {
        let session = self
            .existing(guild_id)
            .ok_or(MusicError::InvalidState("the queue is empty"))?;
        let mut session = session.lock().await;
        if session.queue.is_empty() {
            return Err(MusicError::InvalidState("the queue is empty"));
        }
        session.queue.shuffle();
        Ok(session.queue.len())
    }

    pub async fn remove_at(
        &self,
        guild_id: u64,
        index: usize,
    ) -> Result<TrackDescriptor, MusicError> {
        let session = self
            .existing(guild_id)
            .ok_or(MusicError::InvalidState("the queue is empty"))?;
        let mut session = session.lock().await;
        session
            .queue
            .remove_at(index)
            .ok_or(MusicError::InvalidState("no track at that position"))
    }

    /// Clear the upcoming tracks; the current one keeps playing
    pub async fn clear(&self, guild_id: u64) -> Result<usize, MusicError> {
        let session = self
            .existing(guild_id)
            .ok_or(MusicError::InvalidState("the queue is empty"))?;
        let mut session = session.lock().await;
        Ok(session.queue.clear_upcoming())
    }

    pub async fn set_volume(&self, guild_id: u64, percent: u8) -> Result<(), MusicError> {
        let volume = f32::from(percent.min(100)) / 100.0;
        let session = self.session(guild_id);
        let mut session = session.lock().await;
        session.queue.set_volume(volume);
        if matches!(session.state, PlayerState::Playing | PlayerState::Paused) {
            self.transport.set_volume(guild_id, volume).await?;
        }
        Ok(())
    }

    pub async fn snapshot(&self, guild_id: u64) -> Option<QueueSnapshot> {
        let session = self.existing(guild_id)?;
        let session = session.lock().await;
        Some(QueueSnapshot {
            current: session.queue.current().cloned(),
            upcoming: session.queue.upcoming().cloned().collect(),
            loop_enabled: session.queue.loop_enabled(),
            volume_percent: (session.queue.volume() * 100.0).round() as u8,
        })
    }

    /// Leave the voice channel, dropping any queued work
    pub async fn leave(&self, guild_id: u64) -> Result<(), MusicError> {
        if !self.transport.is_connected(guild_id) {
            return Err(TransportError::NotConnected.into());
        }
        if let Some(session) = self.existing(guild_id) {
            let mut session = session.lock().await;
            session.queue.clear();
            session.state = PlayerState::Idle;
        }
        self.transport.leave(guild_id).await?;
        Ok(())
    }

    #[cfg(test)]
    async fn state(&self, guild_id: u64) -> Option<PlayerState> {
        let session = self.existing(guild_id)?;
        let state = session.lock().await.state;
        Some(state)
    }

    /// Advance until a track starts or the queue runs dry. Tracks that
    /// cannot be started after all retries are reported and dropped so
    /// the queue always makes forward progress.
    async fn play_next(&self, session: &mut PlayerSession) {
        loop {
            let Some(track) = session.queue.advance() else {
                debug!("Queue drained in guild {}, going idle", session.guild_id);
                session.state = PlayerState::Idle;
                return;
            };

            session.state = PlayerState::Resolving;
            let volume = session.queue.volume();
            match self.start_track(session.guild_id, &track, volume).await {
                Ok(()) => {
                    session.state = PlayerState::Playing;
                    info!("Now playing '{}' in guild {}", track.title, session.guild_id);
                    self.report(
                        session,
                        &format!(
                            "🎶 Now playing: **{}** [{}]",
                            track.title,
                            track.duration_display()
                        ),
                    )
                    .await;
                    return;
                }
                Err(e) => {
                    warn!(
                        "Giving up on '{}' in guild {}: {e}",
                        track.title, session.guild_id
                    );
                    self.report(
                        session,
                        &format!("⚠️ Could not play **{}** ({e}), moving on.", track.title),
                    )
                    .await;
                    // Drop the dead track even when looping, so the loop
                    // cannot pin us to something unplayable.
                    session.queue.take_current();
                }
            }
        }
    }

    /// Bounded start attempts with backoff. The URL from the original
    /// resolution is only trusted once; every retry fetches a fresh one.
    async fn start_track(
        &self,
        guild_id: u64,
        track: &TrackDescriptor,
        volume: f32,
    ) -> Result<(), MusicError> {
        let mut last_error = MusicError::InvalidState("playback was never attempted");

        for attempt in 1..=self.config.max_start_attempts {
            if attempt > 1 {
                sleep(self.config.retry_backoff).await;
            }

            let stream_url = if attempt == 1 {
                track.stream_url.clone()
            } else {
                match self.resolver.refresh_stream_url(track).await {
                    Ok(url) => url,
                    Err(e) => {
                        warn!(
                            "Re-resolve of '{}' failed on attempt {attempt}/{}: {e}",
                            track.title, self.config.max_start_attempts
                        );
                        last_error = e.into();
                        continue;
                    }
                }
            };

            match self.transport.play(guild_id, &stream_url, volume).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!("'{}' started on attempt {attempt}", track.title);
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Start of '{}' failed on attempt {attempt}/{}: {e}",
                        track.title, self.config.max_start_attempts
                    );
                    last_error = e.into();
                }
            }
        }

        Err(last_error)
    }

    async fn report(&self, session: &PlayerSession, message: &str) {
        self.announcer
            .announce(session.text_channel_id, message)
            .await;
    }
}

/// Consume transport events until the channel closes. This task is the
/// only caller of `on_track_ended`/`on_disconnected`, so completions are
/// processed strictly in arrival order.
pub fn spawn_event_loop(
    players: Arc<Players>,
    mut events: UnboundedReceiver<PlayerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PlayerEvent::TrackEnded { guild_id, error } => {
                    players.on_track_ended(guild_id, error).await;
                }
                PlayerEvent::Disconnected { guild_id } => {
                    players.on_disconnected(guild_id).await;
                }
            }
        }
        debug!("Player event channel closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

    const GUILD: u64 = 10;
    const VOICE: u64 = 100;
    const TEXT: u64 = 200;

    fn track(title: &str) -> TrackDescriptor {
        TrackDescriptor {
            title: title.to_string(),
            query: TrackQuery::SearchTerm(title.to_string()),
            stream_url: format!("https://cdn.example/{title}"),
            duration_secs: Some(180),
            thumbnail_url: None,
            uploader: None,
            webpage_url: Some(format!("https://watch.example/{title}")),
        }
    }

    struct FakeResolver {
        results: HashMap<String, Vec<TrackDescriptor>>,
        refresh_calls: AtomicUsize,
        fail_refresh: AtomicBool,
    }

    impl FakeResolver {
        fn with(results: &[(&str, Vec<TrackDescriptor>)]) -> Self {
            FakeResolver {
                results: results
                    .iter()
                    .map(|(q, t)| (q.to_string(), t.clone()))
                    .collect(),
                refresh_calls: AtomicUsize::new(0),
                fail_refresh: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl TrackResolver for FakeResolver {
        async fn resolve(&self, query: &TrackQuery) -> Result<Vec<TrackDescriptor>, ResolveError> {
            self.results
                .get(query.as_str())
                .cloned()
                .ok_or_else(|| ResolveError::NoResults(query.as_str().to_string()))
        }

        async fn refresh_stream_url(
            &self,
            track: &TrackDescriptor,
        ) -> Result<String, ResolveError> {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_refresh.load(Ordering::SeqCst) {
                return Err(ResolveError::Tool("refresh refused".into()));
            }
            Ok(format!("{}?fresh={n}", track.stream_url))
        }
    }

    struct FakeTransport {
        ops: StdMutex<Vec<String>>,
        connected: StdMutex<bool>,
        /// play() fails for URLs starting with any of these
        failing_prefixes: StdMutex<Vec<String>>,
        fail_join: AtomicBool,
        /// when set, play() immediately queues a completion event and
        /// stop() queues one too (mirrors the real transport)
        events: StdMutex<Option<UnboundedSender<PlayerEvent>>>,
        auto_end: AtomicBool,
    }

    impl FakeTransport {
        fn new() -> Self {
            FakeTransport {
                ops: StdMutex::new(Vec::new()),
                connected: StdMutex::new(false),
                failing_prefixes: StdMutex::new(Vec::new()),
                fail_join: AtomicBool::new(false),
                events: StdMutex::new(None),
                auto_end: AtomicBool::new(false),
            }
        }

        fn fail_urls_starting_with(&self, prefix: &str) {
            self.failing_prefixes
                .lock()
                .unwrap()
                .push(prefix.to_string());
        }

        fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }

        fn plays(&self) -> Vec<String> {
            self.ops()
                .into_iter()
                .filter(|op| op.starts_with("play:"))
                .collect()
        }

        fn record(&self, op: String) {
            self.ops.lock().unwrap().push(op);
        }

        fn send(&self, event: PlayerEvent) {
            if let Some(tx) = self.events.lock().unwrap().as_ref() {
                let _ = tx.send(event);
            }
        }
    }

    #[async_trait]
    impl AudioTransport for FakeTransport {
        async fn join(&self, guild_id: u64, channel_id: u64) -> Result<(), TransportError> {
            self.record(format!("join:{guild_id}:{channel_id}"));
            if self.fail_join.load(Ordering::SeqCst) {
                return Err(TransportError::JoinFailed("refused".into()));
            }
            *self.connected.lock().unwrap() = true;
            Ok(())
        }

        async fn leave(&self, guild_id: u64) -> Result<(), TransportError> {
            self.record(format!("leave:{guild_id}"));
            *self.connected.lock().unwrap() = false;
            Ok(())
        }

        fn is_connected(&self, _guild_id: u64) -> bool {
            *self.connected.lock().unwrap()
        }

        async fn play(
            &self,
            guild_id: u64,
            stream_url: &str,
            _volume: f32,
        ) -> Result<(), TransportError> {
            self.record(format!("play:{stream_url}"));
            let fails = self
                .failing_prefixes
                .lock()
                .unwrap()
                .iter()
                .any(|p| stream_url.starts_with(p.as_str()));
            if fails {
                return Err(TransportError::StartFailed("bad stream".into()));
            }
            if self.auto_end.load(Ordering::SeqCst) {
                self.send(PlayerEvent::TrackEnded {
                    guild_id,
                    error: None,
                });
            }
            Ok(())
        }

        async fn pause(&self, guild_id: u64) -> Result<(), TransportError> {
            self.record(format!("pause:{guild_id}"));
            Ok(())
        }

        async fn resume(&self, guild_id: u64) -> Result<(), TransportError> {
            self.record(format!("resume:{guild_id}"));
            Ok(())
        }

        async fn stop(&self, guild_id: u64) -> Result<(), TransportError> {
            self.record(format!("stop:{guild_id}"));
            self.send(PlayerEvent::TrackEnded {
                guild_id,
                error: None,
            });
            Ok(())
        }

        async fn set_volume(&self, guild_id: u64, volume: f32) -> Result<(), TransportError> {
            self.record(format!("volume:{guild_id}:{volume}"));
            Ok(())
        }
    }

    struct RecordingAnnouncer {
        messages: StdMutex<Vec<(u64, String)>>,
    }

    impl RecordingAnnouncer {
        fn new() -> Self {
            RecordingAnnouncer {
                messages: StdMutex::new(Vec::new()),
            }
        }

        fn messages(&self) -> Vec<(u64, String)> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Announcer for RecordingAnnouncer {
        async fn announce(&self, channel_id: u64, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push((channel_id, message.to_string()));
        }
    }

    struct Rig {
        players: Arc<Players>,
        resolver: Arc<FakeResolver>,
        transport: Arc<FakeTransport>,
        announcer: Arc<RecordingAnnouncer>,
    }

    fn rig(results: &[(&str, Vec<TrackDescriptor>)]) -> Rig {
        let resolver = Arc::new(FakeResolver::with(results));
        let transport = Arc::new(FakeTransport::new());
        let announcer = Arc::new(RecordingAnnouncer::new());
        let config = PlayerConfig {
            max_start_attempts: 3,
            retry_backoff: Duration::from_millis(20),
        };
        let players = Arc::new(Players::new(
            resolver.clone(),
            transport.clone(),
            announcer.clone(),
            config,
        ));
        Rig {
            players,
            resolver,
            transport,
            announcer,
        }
    }

    #[tokio::test]
    async fn enqueue_when_idle_joins_and_starts_playback() {
        let rig = rig(&[("song a", vec![track("A")])]);
        let titles = rig
            .players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();

        assert_eq!(titles, vec!["A".to_string()]);
        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Playing));
        assert_eq!(
            rig.transport.ops(),
            vec![
                format!("join:{GUILD}:{VOICE}"),
                "play:https://cdn.example/A".to_string(),
            ]
        );

        let snapshot = rig.players.snapshot(GUILD).await.unwrap();
        assert_eq!(snapshot.current.unwrap().title, "A");
        assert!(snapshot.upcoming.is_empty());
    }

    #[tokio::test]
    async fn enqueue_while_playing_only_appends() {
        let rig = rig(&[("song a", vec![track("A")]), ("song b", vec![track("B")])]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song b")
            .await
            .unwrap();

        assert_eq!(rig.transport.plays().len(), 1);
        let snapshot = rig.players.snapshot(GUILD).await.unwrap();
        assert_eq!(snapshot.current.unwrap().title, "A");
        assert_eq!(snapshot.upcoming.len(), 1);
        assert_eq!(snapshot.upcoming[0].title, "B");
    }

    #[tokio::test]
    async fn resolver_failure_leaves_the_queue_untouched() {
        let rig = rig(&[("song a", vec![track("A")])]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();

        let err = rig
            .players
            .enqueue_from_query(GUILD, VOICE, TEXT, "unknown thing")
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::Resolve(ResolveError::NoResults(_))));

        let snapshot = rig.players.snapshot(GUILD).await.unwrap();
        assert!(snapshot.upcoming.is_empty());
        assert_eq!(snapshot.current.unwrap().title, "A");
    }

    #[tokio::test]
    async fn completions_drain_the_queue_in_fifo_order() {
        let rig = rig(&[(
            "https://list.example/mix",
            vec![track("A"), track("B"), track("C")],
        )]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "https://list.example/mix")
            .await
            .unwrap();

        rig.players.on_track_ended(GUILD, None).await;
        rig.players.on_track_ended(GUILD, None).await;
        rig.players.on_track_ended(GUILD, None).await;

        assert_eq!(
            rig.transport.plays(),
            vec![
                "play:https://cdn.example/A",
                "play:https://cdn.example/B",
                "play:https://cdn.example/C",
            ]
        );
        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Idle));
        assert!(rig.players.snapshot(GUILD).await.unwrap().current.is_none());
    }

    #[tokio::test]
    async fn loop_mode_replays_the_same_track() {
        let rig = rig(&[("song a", vec![track("A"), track("B")])]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();
        assert!(rig.players.toggle_loop(GUILD).await);

        rig.players.on_track_ended(GUILD, None).await;
        rig.players.on_track_ended(GUILD, None).await;

        assert_eq!(
            rig.transport.plays(),
            vec![
                "play:https://cdn.example/A",
                "play:https://cdn.example/A",
                "play:https://cdn.example/A",
            ]
        );
        // B is still waiting behind the loop.
        assert_eq!(rig.players.snapshot(GUILD).await.unwrap().upcoming.len(), 1);

        assert!(!rig.players.toggle_loop(GUILD).await);
        rig.players.on_track_ended(GUILD, None).await;
        assert_eq!(
            rig.players
                .snapshot(GUILD)
                .await
                .unwrap()
                .current
                .unwrap()
                .title,
            "B"
        );
    }

    #[tokio::test]
    async fn retries_refresh_the_stream_url_each_time() {
        let rig = rig(&[("song a", vec![track("A"), track("B")])]);
        // Everything for A fails: the original URL and both refreshed ones.
        rig.transport
            .fail_urls_starting_with("https://cdn.example/A");

        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();

        let plays = rig.transport.plays();
        assert_eq!(
            plays,
            vec![
                "play:https://cdn.example/A",
                "play:https://cdn.example/A?fresh=1",
                "play:https://cdn.example/A?fresh=2",
                "play:https://cdn.example/B",
            ]
        );
        assert_eq!(rig.resolver.refresh_calls.load(Ordering::SeqCst), 2);

        // B took over: forward progress, not a stall on A.
        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Playing));
        assert_eq!(
            rig.players
                .snapshot(GUILD)
                .await
                .unwrap()
                .current
                .unwrap()
                .title,
            "B"
        );

        let reports = rig.announcer.messages();
        assert!(reports.iter().any(|(ch, m)| *ch == TEXT && m.contains("Could not play")));
        assert!(reports.iter().any(|(ch, m)| *ch == TEXT && m.contains("Now playing")));
    }

    #[tokio::test]
    async fn exhausting_the_queue_after_failures_goes_idle() {
        let rig = rig(&[("song a", vec![track("A")])]);
        rig.transport
            .fail_urls_starting_with("https://cdn.example/A");

        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();

        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Idle));
        assert!(rig.players.snapshot(GUILD).await.unwrap().current.is_none());
    }

    #[tokio::test]
    async fn a_dead_track_does_not_pin_a_looping_queue() {
        let rig = rig(&[("song a", vec![track("A"), track("B")])]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();
        rig.players.toggle_loop(GUILD).await;

        // A dies mid-loop: the completion retries A, drops it, lands on B.
        rig.transport
            .fail_urls_starting_with("https://cdn.example/A");
        rig.players.on_track_ended(GUILD, None).await;

        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Playing));
        assert_eq!(
            rig.players
                .snapshot(GUILD)
                .await
                .unwrap()
                .current
                .unwrap()
                .title,
            "B"
        );
    }

    #[tokio::test]
    async fn pause_and_resume_follow_the_state_machine() {
        let rig = rig(&[("song a", vec![track("A")])]);

        // Nothing playing yet.
        assert!(rig.players.pause(GUILD).await.is_err());
        assert!(rig.players.resume(GUILD).await.is_err());

        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();

        assert!(rig.players.resume(GUILD).await.is_err());
        rig.players.pause(GUILD).await.unwrap();
        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Paused));
        assert!(rig.players.pause(GUILD).await.is_err());
        rig.players.resume(GUILD).await.unwrap();
        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Playing));
    }

    #[tokio::test]
    async fn skip_stops_the_transport_and_the_completion_advances() {
        let rig = rig(&[("song a", vec![track("A"), track("B")])]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();

        let skipped = rig.players.skip(GUILD).await.unwrap();
        assert_eq!(skipped, "A");
        assert!(rig.transport.ops().contains(&format!("stop:{GUILD}")));

        // The transport's completion event is the only advance.
        rig.players.on_track_ended(GUILD, None).await;
        assert_eq!(
            rig.players
                .snapshot(GUILD)
                .await
                .unwrap()
                .current
                .unwrap()
                .title,
            "B"
        );
        assert_eq!(rig.transport.plays().len(), 2);
    }

    #[tokio::test]
    async fn skip_without_an_active_track_is_rejected() {
        let rig = rig(&[]);
        assert!(rig.players.skip(GUILD).await.is_err());
    }

    #[tokio::test]
    async fn stop_clears_everything_and_parks_idle() {
        let rig = rig(&[(
            "song a",
            vec![track("A"), track("B"), track("C")],
        )]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();

        rig.players.stop(GUILD).await.unwrap();
        // Completion event from the stopped track.
        rig.players.on_track_ended(GUILD, None).await;

        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Idle));
        let snapshot = rig.players.snapshot(GUILD).await.unwrap();
        assert!(snapshot.current.is_none());
        assert!(snapshot.upcoming.is_empty());
        // Only the one original play: the stop did not restart anything.
        assert_eq!(rig.transport.plays().len(), 1);
    }

    #[tokio::test]
    async fn volume_updates_the_queue_and_the_live_track() {
        let rig = rig(&[("song a", vec![track("A")])]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();

        rig.players.set_volume(GUILD, 30).await.unwrap();
        assert_eq!(
            rig.players.snapshot(GUILD).await.unwrap().volume_percent,
            30
        );
        assert!(rig
            .transport
            .ops()
            .contains(&format!("volume:{GUILD}:0.3")));
    }

    #[tokio::test]
    async fn disconnect_with_work_reconnects_and_restarts_current() {
        let rig = rig(&[("song a", vec![track("A"), track("B")])]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();

        rig.players.on_disconnected(GUILD).await;

        let ops = rig.transport.ops();
        let joins: Vec<_> = ops.iter().filter(|op| op.starts_with("join:")).collect();
        assert_eq!(joins.len(), 2, "one initial join plus one reconnect");
        // Restart went through the refresh path for a fresh URL on retry
        // or reused the original on the first attempt.
        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Playing));
        assert_eq!(
            rig.players
                .snapshot(GUILD)
                .await
                .unwrap()
                .current
                .unwrap()
                .title,
            "A"
        );
    }

    #[tokio::test]
    async fn disconnect_without_work_goes_quietly_idle() {
        let rig = rig(&[("song a", vec![track("A")])]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();
        rig.players.on_track_ended(GUILD, None).await; // drained

        rig.players.on_disconnected(GUILD).await;

        let joins = rig
            .transport
            .ops()
            .iter()
            .filter(|op| op.starts_with("join:"))
            .count();
        assert_eq!(joins, 1, "no reconnect without pending work");
        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Idle));
    }

    #[tokio::test]
    async fn failed_reconnect_reports_and_gives_up() {
        let rig = rig(&[("song a", vec![track("A"), track("B")])]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();

        rig.transport.fail_join.store(true, Ordering::SeqCst);
        rig.players.on_disconnected(GUILD).await;

        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Idle));
        assert!(rig
            .announcer
            .messages()
            .iter()
            .any(|(ch, m)| *ch == TEXT && m.contains("could not get it back")));
    }

    #[tokio::test]
    async fn event_loop_drains_a_queue_end_to_end() {
        let rig = rig(&[(
            "https://list.example/mix",
            vec![track("A"), track("B")],
        )]);

        let (tx, rx) = unbounded_channel();
        *rig.transport.events.lock().unwrap() = Some(tx);
        rig.transport.auto_end.store(true, Ordering::SeqCst);
        let _loop_handle = spawn_event_loop(rig.players.clone(), rx);

        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "https://list.example/mix")
            .await
            .unwrap();

        // Every play completes instantly, so the loop should walk the
        // whole queue and park the player idle.
        for _ in 0..200 {
            if rig.players.state(GUILD).await == Some(PlayerState::Idle) {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(rig.players.state(GUILD).await, Some(PlayerState::Idle));
        assert_eq!(
            rig.transport.plays(),
            vec![
                "play:https://cdn.example/A",
                "play:https://cdn.example/B",
            ]
        );
    }

    #[tokio::test]
    async fn remove_and_clear_manage_the_upcoming_list() {
        let rig = rig(&[(
            "song a",
            vec![track("A"), track("B"), track("C"), track("D")],
        )]);
        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();

        let removed = rig.players.remove_at(GUILD, 1).await.unwrap();
        assert_eq!(removed.title, "C");
        assert!(rig.players.remove_at(GUILD, 9).await.is_err());

        let cleared = rig.players.clear(GUILD).await.unwrap();
        assert_eq!(cleared, 2);
        // The playing track survives a clear.
        assert_eq!(
            rig.players
                .snapshot(GUILD)
                .await
                .unwrap()
                .current
                .unwrap()
                .title,
            "A"
        );
    }

    #[tokio::test]
    async fn leave_requires_a_connection_and_drops_the_queue() {
        let rig = rig(&[("song a", vec![track("A"), track("B")])]);
        assert!(rig.players.leave(GUILD).await.is_err());

        rig.players
            .enqueue_from_query(GUILD, VOICE, TEXT, "song a")
            .await
            .unwrap();
        rig.players.leave(GUILD).await.unwrap();

        assert!(rig.transport.ops().contains(&format!("leave:{GUILD}")));
        let snapshot = rig.players.snapshot(GUILD).await.unwrap();
        assert!(snapshot.current.is_none());
        assert!(snapshot.upcoming.is_empty());
    }
}
