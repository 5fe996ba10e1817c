//! Track descriptors and queries

/// What the user handed us: a direct link or words to search for.
/// Decided once at the command boundary and carried along unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackQuery {
    Url(String),
    SearchTerm(String),
}

impl TrackQuery {
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            TrackQuery::Url(trimmed.to_string())
        } else {
            TrackQuery::SearchTerm(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TrackQuery::Url(s) | TrackQuery::SearchTerm(s) => s,
        }
    }
}

/// Metadata plus a streamable source for one playable item.
///
/// `stream_url` is short-lived (the platform expires it), so the player
/// refreshes it through [`resolve_key`](Self::resolve_key) when a start
/// attempt has to be retried.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    pub title: String,
    pub query: TrackQuery,
    pub stream_url: String,
    pub duration_secs: Option<u64>,
    pub thumbnail_url: Option<String>,
    pub uploader: Option<String>,
    pub webpage_url: Option<String>,
}

impl TrackDescriptor {
    /// Stable identity used to re-resolve an expired stream URL: the
    /// canonical page when we have it, the original query otherwise.
    pub fn resolve_key(&self) -> TrackQuery {
        match &self.webpage_url {
            Some(url) => TrackQuery::Url(url.clone()),
            None => self.query.clone(),
        }
    }

    /// `m:ss` / `h:mm:ss` display, or `?:??` when unknown
    pub fn duration_display(&self) -> String {
        match self.duration_secs {
            None => "?:??".to_string(),
            Some(total) => {
                let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
                if hours > 0 {
                    format!("{hours}:{minutes:02}:{seconds:02}")
                } else {
                    format!("{minutes}:{seconds:02}")
                }
            }
        }
    }
}
