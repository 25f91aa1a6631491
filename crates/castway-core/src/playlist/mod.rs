//! Playlist ingestion
//!
//! Accepts the two channel-list shapes found in the wild:
//! - a JSON array of loosely keyed channel objects
//! - extended M3U with `#EXTINF`/`#EXTVLCOPT` directives and pipe options
//!
//! Parsing never fails. Malformed records are logged and skipped.

pub mod json;
pub mod loader;
pub mod m3u;

pub use loader::{LoaderConfig, PlaylistLoader};

use crate::types::ChannelEntry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// Detected playlist encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistFormat {
    Json,
    M3u,
}

impl std::fmt::Display for PlaylistFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaylistFormat::Json => write!(f, "json"),
            PlaylistFormat::M3u => write!(f, "m3u"),
        }
    }
}

/// Why a record was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// JSON array element is not an object
    NotAnObject,
    /// Record has no usable stream URL
    MissingUrl,
    /// Pipe option could not be percent-decoded
    MalformedOption(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotAnObject => write!(f, "record is not an object"),
            SkipReason::MissingUrl => write!(f, "record has no stream url"),
            SkipReason::MalformedOption(key) => write!(f, "malformed option '{}'", key),
        }
    }
}

/// One skipped record; `position` is the 1-based line (M3U) or array index (JSON)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSkip {
    pub position: usize,
    pub reason: SkipReason,
}

impl ParseSkip {
    pub(crate) fn record(position: usize, reason: SkipReason) -> Self {
        warn!(position, reason = %reason, "Skipped malformed playlist record");
        Self { position, reason }
    }
}

/// Parse result with diagnostics
#[derive(Debug, Clone)]
pub struct ParsedPlaylist {
    pub format: PlaylistFormat,
    pub entries: Vec<ChannelEntry>,
    pub skipped: Vec<ParseSkip>,
}

/// Parse playlist text into normalized entries
///
/// `source_url` is the playlist's own location and serves as the base for
/// relative stream URLs.
pub fn parse(text: &str, source_url: &str) -> Vec<ChannelEntry> {
    parse_detailed(text, source_url).entries
}

/// Parse playlist text, keeping the format and skip diagnostics
pub fn parse_detailed(text: &str, source_url: &str) -> ParsedPlaylist {
    let parsed = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Array(records)) => {
            let (entries, skipped) = json::parse_json_records(&records, source_url);
            ParsedPlaylist {
                format: PlaylistFormat::Json,
                entries,
                skipped,
            }
        }
        _ => {
            let (entries, skipped) = m3u::parse_m3u(text, source_url);
            ParsedPlaylist {
                format: PlaylistFormat::M3u,
                entries,
                skipped,
            }
        }
    };

    debug!(
        format = %parsed.format,
        entries = parsed.entries.len(),
        skipped = parsed.skipped.len(),
        "Playlist parsed"
    );
    parsed
}

/// Resolve `url` against `base` when it is not already absolute
///
/// Any resolution failure returns the input unchanged.
pub fn resolve_url(url: &str, base: &str) -> String {
    if Url::parse(url).is_ok() {
        return url.to_string();
    }
    match Url::parse(base).and_then(|base| base.join(url)) {
        Ok(resolved) => resolved.to_string(),
        Err(e) => {
            debug!(url, base, error = %e, "Could not resolve relative URL");
            url.to_string()
        }
    }
}

/// Keep entries whose name or group contains `query`, case-insensitively
///
/// Surrounding whitespace in the query is ignored.
pub fn filter_entries<'a>(entries: &'a [ChannelEntry], query: &str) -> Vec<&'a ChannelEntry> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return entries.iter().collect();
    }
    entries
        .iter()
        .filter(|entry| {
            entry.name.to_lowercase().contains(&needle)
                || entry
                    .group
                    .as_deref()
                    .is_some_and(|group| group.to_lowercase().contains(&needle))
        })
        .collect()
}

pub(crate) fn generate_entry_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_array_detected() {
        let parsed = parse_detailed(r#"[{"title":"B","url":"http://x/b.mp4"}]"#, "http://x/list.json");
        assert_eq!(parsed.format, PlaylistFormat::Json);
        assert_eq!(parsed.entries.len(), 1);
    }

    #[test]
    fn test_json_object_falls_back_to_m3u() {
        let parsed = parse_detailed(r#"{"url":"http://x/b.mp4"}"#, "http://x/list.json");
        assert_eq!(parsed.format, PlaylistFormat::M3u);
        // A lone JSON object line is neither a directive nor a comment.
        assert_eq!(parsed.entries.len(), 1);
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(resolve_url("a.m3u8", "http://x/lists/main.m3u"), "http://x/lists/a.m3u8");
        assert_eq!(resolve_url("/live/a.m3u8", "http://x/lists/main.m3u"), "http://x/live/a.m3u8");
        assert_eq!(resolve_url("http://y/a.m3u8", "http://x/"), "http://y/a.m3u8");
        assert_eq!(resolve_url("a.m3u8", "not a url"), "a.m3u8");
    }

    #[test]
    fn test_filter_entries() {
        let mut news = ChannelEntry::new("1", "World News", "http://x/1");
        news.group = Some("News".to_string());
        let mut sport = ChannelEntry::new("2", "Arena 1", "http://x/2");
        sport.group = Some("Sports".to_string());
        let entries = vec![news, sport];

        assert_eq!(filter_entries(&entries, "news").len(), 1);
        assert_eq!(filter_entries(&entries, "SPORT")[0].id, "2");
        assert_eq!(filter_entries(&entries, "  ").len(), 2);
        assert_eq!(filter_entries(&entries, " news ").len(), 1);
        assert!(filter_entries(&entries, "movies").is_empty());
    }
}
