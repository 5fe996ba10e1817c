//! Track resolution via yt-dlp
//!
//! Turns a URL or search term into one or more playable descriptors by
//! running `yt-dlp -j` and reading one JSON object per line. All calls are
//! bounded by a timeout and the child is killed if we stop waiting.
//!
//! The player consumes this through the [`TrackResolver`] trait so the
//! state machine can be tested without spawning processes.

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

use super::track::{TrackDescriptor, TrackQuery};

pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("track lookup timed out after {0} seconds")]
    Timeout(u64),
    #[error("could not run yt-dlp: {0}")]
    Spawn(String),
    #[error("yt-dlp failed: {0}")]
    Tool(String),
    #[error("unreadable track metadata: {0}")]
    Malformed(String),
    #[error("no playable results for '{0}'")]
    NoResults(String),
}

#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve a query into playable descriptors, in playback order.
    /// Never returns an empty list; "nothing found" is an error.
    async fn resolve(&self, query: &TrackQuery) -> Result<Vec<TrackDescriptor>, ResolveError>;

    /// Fetch a fresh stream URL for a known track. Used on retries, when
    /// the previously resolved URL may have expired.
    async fn refresh_stream_url(&self, track: &TrackDescriptor) -> Result<String, ResolveError>;
}

pub struct YtDlpResolver {
    binary: String,
    resolve_timeout: Duration,
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpResolver {
    pub fn new() -> Self {
        YtDlpResolver {
            binary: "yt-dlp".to_string(),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    pub fn with_timeout(resolve_timeout: Duration) -> Self {
        YtDlpResolver {
            binary: "yt-dlp".to_string(),
            resolve_timeout,
        }
    }

    fn target_argument(query: &TrackQuery) -> String {
        match query {
            TrackQuery::Url(url) => url.clone(),
            TrackQuery::SearchTerm(term) => format!("ytsearch1:{term}"),
        }
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &TrackQuery) -> Result<Vec<TrackDescriptor>, ResolveError> {
        let target = Self::target_argument(query);
        debug!("Resolving '{target}' via {}", self.binary);

        let mut cmd = Command::new(&self.binary);
        cmd.args(["-j", "--no-warnings", "-f", "bestaudio/best", &target])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(self.resolve_timeout, cmd.output())
            .await
            .map_err(|_| ResolveError::Timeout(self.resolve_timeout.as_secs()))?
            .map_err(|e| ResolveError::Spawn(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Tool(
                stderr.lines().last().unwrap_or("unknown error").to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_entries(&stdout, query)
    }

    async fn refresh_stream_url(&self, track: &TrackDescriptor) -> Result<String, ResolveError> {
        let key = track.resolve_key();
        let fresh = self.resolve(&key).await?;
        // resolve never returns an empty Ok
        Ok(fresh[0].stream_url.clone())
    }
}

#[derive(Deserialize)]
struct YtDlpEntry {
    title: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    uploader: Option<String>,
    webpage_url: Option<String>,
}

/// One JSON object per line; entries without a direct media URL are
/// skipped (live fragments, premieres).
fn parse_entries(stdout: &str, query: &TrackQuery) -> Result<Vec<TrackDescriptor>, ResolveError> {
    let mut tracks = Vec::new();

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let entry: YtDlpEntry =
            serde_json::from_str(line).map_err(|e| ResolveError::Malformed(e.to_string()))?;

        let Some(stream_url) = entry.url else {
            warn!(
                "Skipping result without a stream URL: {}",
                entry.title.as_deref().unwrap_or("<untitled>")
            );
            continue;
        };

        tracks.push(TrackDescriptor {
            title: entry.title.unwrap_or_else(|| "Unknown title".to_string()),
            query: query.clone(),
            stream_url,
            duration_secs: entry.duration.map(|d| d.round() as u64),
            thumbnail_url: entry.thumbnail,
            uploader: entry.uploader,
            webpage_url: entry.webpage_url,
        });
    }

    if tracks.is_empty() {
        return Err(ResolveError::NoResults(query.as_str().to_string()));
    }
    Ok(tracks)
}
