//! Remote playlist loading

use super::{parse_detailed, ParsedPlaylist};
use crate::error::{Error, Result};
use crate::proxy::ProxyConfig;
use crate::types::ChannelEntry;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Notice shown to the user when a playlist cannot be fetched
pub const FETCH_FAILURE_NOTICE: &str =
    "Failed to fetch playlist. Check the URL or ensure your CORS Proxy is working.";

/// HTTP settings for playlist fetches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// User agent sent with playlist requests
    pub user_agent: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            user_agent: format!("castway/{}", crate::VERSION),
        }
    }
}

/// Clears the loading flag when dropped
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Fetches playlist text and hands it to the parser
pub struct PlaylistLoader {
    client: Client,
    loading: Arc<AtomicBool>,
}

impl PlaylistLoader {
    /// Create a loader with its own HTTP client
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            loading: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a load is in flight
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Shared handle on the loading flag, for status displays
    pub fn loading_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.loading)
    }

    /// Fetch and parse the playlist at `url`
    pub async fn load(&self, url: &str, proxy: &ProxyConfig) -> Result<Vec<ChannelEntry>> {
        Ok(self.load_detailed(url, proxy).await?.entries)
    }

    /// Fetch and parse, keeping format and skip diagnostics
    #[instrument(skip(self, proxy), fields(proxied = proxy.enabled))]
    pub async fn load_detailed(&self, url: &str, proxy: &ProxyConfig) -> Result<ParsedPlaylist> {
        let _guard = LoadingGuard::enter(&self.loading);

        let fetch_url = proxy.rewrite(url);
        info!(fetch_url = %fetch_url, "Fetching playlist");

        let response = self
            .client
            .get(&fetch_url)
            .header(ACCEPT, "text/*, application/json;q=0.9, */*;q=0.8")
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Playlist request failed");
                Error::Network(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Playlist fetch rejected");
            return Err(Error::Fetch {
                status: status.as_u16(),
            });
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            debug!(content_type = ?content_type, "Playlist response");
        }

        let text = response.text().await?;
        let parsed = parse_detailed(&text, url);

        info!(
            format = %parsed.format,
            entries = parsed.entries.len(),
            skipped = parsed.skipped.len(),
            "Playlist loaded"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_guard_clears_flag() {
        let flag = AtomicBool::new(false);
        {
            let _guard = LoadingGuard::enter(&flag);
            assert!(flag.load(Ordering::SeqCst));
        }
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert_eq!(config.request_timeout_ms, 30_000);
        assert!(config.user_agent.starts_with("castway/"));
    }

    #[tokio::test]
    async fn test_unreachable_host_clears_loading() {
        let loader = PlaylistLoader::new(&LoaderConfig {
            request_timeout_ms: 500,
            ..Default::default()
        })
        .unwrap();
        let proxy = ProxyConfig::new(false, "https://corsproxy.io/?{url}");

        let result = loader.load("http://127.0.0.1:9/list.m3u", &proxy).await;
        assert!(result.is_err());
        assert!(!loader.is_loading());
    }
}
