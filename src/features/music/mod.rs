//! # Music Playback Feature
//!
//! Per-guild playback queues driven by a resolve → stream → play →
//! completion → advance loop. Track metadata comes from yt-dlp; audio
//! goes out through songbird. The state machine only ever talks to those
//! two through traits, so all of its transitions are unit-tested with
//! fakes.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.8.0
//! - **Toggleable**: false

pub mod player;
pub mod queue;
pub mod resolver;
pub mod track;
pub mod transport;

pub use player::{
    spawn_event_loop, Announcer, HttpAnnouncer, MusicError, PlayerConfig, Players, QueueSnapshot,
};
pub use queue::PlaybackQueue;
pub use resolver::{ResolveError, TrackResolver, YtDlpResolver};
pub use track::{TrackDescriptor, TrackQuery};
pub use transport::{AudioTransport, PlayerEvent, SongbirdTransport, TransportError};
