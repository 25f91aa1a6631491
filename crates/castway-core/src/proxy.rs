//! CORS bypass proxy configuration and URL rewriting
//!
//! A proxy template is any URL containing the literal `{url}` placeholder,
//! e.g. `https://corsproxy.io/?{url}`. Rewriting substitutes the
//! percent-encoded target URL into the placeholder.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Placeholder substituted by the rewriter
pub const URL_PLACEHOLDER: &str = "{url}";

/// Template used when none has been configured
pub const DEFAULT_PROXY_TEMPLATE: &str = "https://corsproxy.io/?{url}";

/// Process-wide proxy settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Route every request through the proxy
    pub enabled: bool,
    /// Proxy URL template containing `{url}`
    pub template: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            template: DEFAULT_PROXY_TEMPLATE.to_string(),
        }
    }
}

impl ProxyConfig {
    pub fn new(enabled: bool, template: impl Into<String>) -> Self {
        Self {
            enabled,
            template: template.into(),
        }
    }

    /// Check that the template can actually carry a URL
    pub fn validate(&self) -> Result<()> {
        validate_template(&self.template)
    }

    /// Rewrite using the configured `enabled` flag
    pub fn rewrite(&self, url: &str) -> String {
        rewrite(url, self.enabled, &self.template)
    }

    /// Rewrite with an explicit proxy decision, ignoring `enabled`
    pub fn rewrite_with(&self, url: &str, use_proxy: bool) -> String {
        rewrite(url, use_proxy, &self.template)
    }
}

/// Reject templates without the `{url}` placeholder
pub fn validate_template(template: &str) -> Result<()> {
    if template.contains(URL_PLACEHOLDER) {
        Ok(())
    } else {
        Err(Error::InvalidProxyTemplate(template.to_string()))
    }
}

/// Portion of the template that every proxied URL starts with
///
/// This is the text before the first `?`, cut short at the placeholder when
/// the placeholder sits in the path.
pub fn template_base(template: &str) -> &str {
    let end = [template.find('?'), template.find(URL_PLACEHOLDER)]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(template.len());
    &template[..end]
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Produce the URL actually sent to the network
///
/// Returns `url` unchanged when proxying is disabled, the URL is empty or not
/// HTTP(S), or the URL already goes through this proxy.
pub fn rewrite(url: &str, proxy_enabled: bool, template: &str) -> String {
    if !proxy_enabled || url.is_empty() || !has_http_scheme(url) {
        return url.to_string();
    }

    let base = template_base(template);
    if !base.is_empty() && url.contains(base) {
        return url.to_string();
    }

    template.replace(URL_PLACEHOLDER, &urlencoding::encode(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "https://corsproxy.io/?{url}";

    #[test]
    fn test_rewrite_encodes_target() {
        let out = rewrite("http://x/a.m3u8?t=1", true, TEMPLATE);
        assert_eq!(out, "https://corsproxy.io/?http%3A%2F%2Fx%2Fa.m3u8%3Ft%3D1");
    }

    #[test]
    fn test_rewrite_disabled_passthrough() {
        for url in ["http://x/a.m3u8", "", "rtmp://x/live", "relative/path.ts"] {
            assert_eq!(rewrite(url, false, TEMPLATE), url);
        }
    }

    #[test]
    fn test_rewrite_skips_non_http() {
        assert_eq!(rewrite("", true, TEMPLATE), "");
        assert_eq!(rewrite("blob:abc", true, TEMPLATE), "blob:abc");
        assert_eq!(rewrite("segment0.ts", true, TEMPLATE), "segment0.ts");
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        for template in [TEMPLATE, "https://proxy.local/fetch/{url}", "http://p:8080/?key=1&u={url}"] {
            let once = rewrite("https://cdn.example.com/live/index.m3u8", true, template);
            let twice = rewrite(&once, true, template);
            assert_eq!(once, twice, "template {}", template);
        }
    }

    #[test]
    fn test_template_base() {
        assert_eq!(template_base(TEMPLATE), "https://corsproxy.io/");
        assert_eq!(template_base("https://p/raw/{url}"), "https://p/raw/");
        assert_eq!(template_base("https://p/raw"), "https://p/raw");
    }

    #[test]
    fn test_validate_template() {
        assert!(ProxyConfig::default().validate().is_ok());
        assert!(ProxyConfig::new(true, "https://p/").validate().is_err());
    }

    #[test]
    fn test_config_rewrite_with_override() {
        let config = ProxyConfig::new(false, TEMPLATE);
        assert_eq!(config.rewrite("http://x/a"), "http://x/a");
        assert!(config.rewrite_with("http://x/a", true).starts_with("https://corsproxy.io/?"));
    }
}
