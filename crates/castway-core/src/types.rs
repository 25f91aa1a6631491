//! Core types for Castway

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User agent sentinel meaning "do not override the transport's user agent"
pub const DEFAULT_USER_AGENT: &str = "Default";

/// Display name for entries that carry none
pub const UNKNOWN_STREAM_NAME: &str = "Unknown Stream";

/// Group assigned to entries that carry none
pub const UNCATEGORIZED_GROUP: &str = "Uncategorized";

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// A normalized playlist record
///
/// Entries produced by the playlist parser always carry an absolute `url`
/// when the playlist had a usable base URL. The serialized form matches the
/// persisted `custom_playlists` layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "logo", default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

impl ChannelEntry {
    /// Create an entry with default metadata
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            logo_url: None,
            group: None,
            user_agent: default_user_agent(),
            cookie: None,
            referer: None,
        }
    }

    /// Group name, falling back to the uncategorized bucket
    pub fn group_or_default(&self) -> &str {
        self.group.as_deref().unwrap_or(UNCATEGORIZED_GROUP)
    }

    /// Whether the entry overrides the transport's user agent
    pub fn has_custom_user_agent(&self) -> bool {
        self.user_agent != DEFAULT_USER_AGENT && !self.user_agent.is_empty()
    }

    /// Build the playback request for this entry
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            url: self.url.clone(),
            cookie: self.cookie.clone(),
            referer: self.referer.clone(),
            origin: None,
            user_agent: Some(self.user_agent.clone()),
            drm_scheme: None,
            drm_license_url: None,
            title: Some(self.name.clone()),
        }
    }
}

/// Partial update applied to a custom playlist entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntryPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub cookie: Option<String>,
    pub referer: Option<String>,
}

impl ChannelEntryPatch {
    /// Merge the provided fields into `entry`
    pub fn apply_to(&self, entry: &mut ChannelEntry) {
        if let Some(name) = &self.name {
            entry.name = name.clone();
        }
        if let Some(url) = &self.url {
            entry.url = url.clone();
        }
        if let Some(user_agent) = &self.user_agent {
            entry.user_agent = user_agent.clone();
        }
        if let Some(cookie) = &self.cookie {
            entry.cookie = Some(cookie.clone());
        }
        if let Some(referer) = &self.referer {
            entry.referer = Some(referer.clone());
        }
    }
}

/// A fully specified playback request
///
/// A license URL without a scheme is accepted; the scheme then defaults to
/// Widevine when DRM is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drm_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drm_license_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl StreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_drm(mut self, scheme: Option<&str>, license_url: impl Into<String>) -> Self {
        self.drm_scheme = scheme.map(str::to_string);
        self.drm_license_url = Some(license_url.into());
        self
    }

    /// User agent to send, `None` when unset or the "Default" sentinel
    pub fn effective_user_agent(&self) -> Option<&str> {
        self.user_agent
            .as_deref()
            .filter(|ua| !ua.is_empty() && *ua != DEFAULT_USER_AGENT)
    }

    /// Label shown for the session
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// Playback orchestrator states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlaybackState {
    /// No active stream
    Idle,
    /// Engine constructed and loading
    Initializing { use_proxy: bool },
    /// Engine reported ready
    Playing,
    /// Visible, dismissible playback error
    Error { message: String },
    /// Playback closed and sink detached
    Destroyed,
}

impl PlaybackState {
    /// Whether a session currently owns an engine or an error panel
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlaybackState::Initializing { .. } | PlaybackState::Playing | PlaybackState::Error { .. }
        )
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            PlaybackState::Error { message } => Some(message),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Initializing { use_proxy: true } => write!(f, "initializing(proxied)"),
            PlaybackState::Initializing { use_proxy: false } => write!(f, "initializing(direct)"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Error { .. } => write!(f, "error"),
            PlaybackState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Per-session record of the automatic proxy escalation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempted_proxy_fallback: bool,
}

impl RetryState {
    /// Consume the single escalation allowed per session
    ///
    /// Returns `true` only on the first call.
    pub fn take_proxy_fallback(&mut self) -> bool {
        if self.attempted_proxy_fallback {
            return false;
        }
        self.attempted_proxy_fallback = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_state_single_shot() {
        let mut retry = RetryState::default();
        assert!(retry.take_proxy_fallback());
        assert!(!retry.take_proxy_fallback());
        assert!(retry.attempted_proxy_fallback);
    }

    #[test]
    fn test_effective_user_agent_skips_sentinel() {
        let config = StreamConfig::new("http://x/a.m3u8").with_user_agent("Default");
        assert_eq!(config.effective_user_agent(), None);

        let config = StreamConfig::new("http://x/a.m3u8").with_user_agent("VLC/3.0");
        assert_eq!(config.effective_user_agent(), Some("VLC/3.0"));
    }

    #[test]
    fn test_entry_to_stream_config() {
        let mut entry = ChannelEntry::new("1", "News", "http://x/news.m3u8");
        entry.cookie = Some("sid=1".to_string());
        let config = entry.to_stream_config();
        assert_eq!(config.url, "http://x/news.m3u8");
        assert_eq!(config.title.as_deref(), Some("News"));
        assert_eq!(config.cookie.as_deref(), Some("sid=1"));
        assert_eq!(config.effective_user_agent(), None);
    }

    #[test]
    fn test_entry_serde_layout() {
        let json = r#"{"id":"1","name":"test1","url":"http://localhost:8080/test1","logo":"http://x/l.png"}"#;
        let entry: ChannelEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(entry.logo_url.as_deref(), Some("http://x/l.png"));
        assert_eq!(entry.group_or_default(), UNCATEGORIZED_GROUP);

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["userAgent"], "Default");
        assert_eq!(back["logo"], "http://x/l.png");
    }

    #[test]
    fn test_patch_merges_only_present_fields() {
        let mut entry = ChannelEntry::new("1", "Old", "http://x/old");
        let patch = ChannelEntryPatch {
            name: Some("New".to_string()),
            ..Default::default()
        };
        patch.apply_to(&mut entry);
        assert_eq!(entry.name, "New");
        assert_eq!(entry.url, "http://x/old");
    }
}
