//! Authentication header injection
//!
//! Direct requests get the real header names. Proxied requests get the
//! `X-Forwarded-` prefixed names, which the relay translates back, because a
//! browser-like transport refuses to set `Cookie`, `User-Agent` and friends
//! on cross-origin requests.

use crate::error::{Error, Result};
use crate::types::StreamConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

/// Prefix used for headers the proxy forwards on our behalf
pub const FORWARDED_PREFIX: &str = "X-Forwarded-";

/// Outgoing request surface exposed by a streaming engine
pub trait RequestHeaders {
    /// Set one header; transports may refuse individual names or values
    fn set_header(&mut self, name: &str, value: &str) -> Result<()>;

    /// Mark the request as carrying credentials
    fn set_with_credentials(&mut self, enabled: bool);
}

/// Header name for `field`, prefixed when the request is proxied
pub fn header_name(field: &str, proxied: bool) -> String {
    if proxied {
        format!("{}{}", FORWARDED_PREFIX, field)
    } else {
        field.to_string()
    }
}

/// Attach the stream's authentication headers to `request`
///
/// Every header is attempted independently: a rejected header is logged and
/// the remaining ones are still set. Returns the names that were accepted.
pub fn apply<R>(request: &mut R, config: &StreamConfig, proxied: bool) -> Vec<String>
where
    R: RequestHeaders + ?Sized,
{
    let mut applied = Vec::new();

    if let Some(cookie) = config.cookie.as_deref() {
        request.set_with_credentials(true);
        try_set(request, &header_name("Cookie", proxied), cookie, &mut applied);
    }
    if let Some(user_agent) = config.effective_user_agent() {
        try_set(request, &header_name("User-Agent", proxied), user_agent, &mut applied);
    }
    if let Some(referer) = config.referer.as_deref() {
        try_set(request, &header_name("Referer", proxied), referer, &mut applied);
    }
    if let Some(origin) = config.origin.as_deref() {
        try_set(request, &header_name("Origin", proxied), origin, &mut applied);
    }

    applied
}

fn try_set<R>(request: &mut R, name: &str, value: &str, applied: &mut Vec<String>)
where
    R: RequestHeaders + ?Sized,
{
    match request.set_header(name, value) {
        Ok(()) => {
            debug!(header = name, "Header injected");
            applied.push(name.to_string());
        }
        Err(e) => warn!(header = name, error = %e, "Header rejected, continuing"),
    }
}

/// A request about to be issued: final URL plus headers
#[derive(Debug, Clone, Default)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub with_credentials: bool,
}

impl PreparedRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Header value as text, if present and printable
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl RequestHeaders for PreparedRequest {
    fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::HeaderRejected {
            name: name.to_string(),
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| Error::HeaderRejected {
            name: name.to_string(),
        })?;
        self.headers.insert(header, value);
        Ok(())
    }

    fn set_with_credentials(&mut self, enabled: bool) {
        self.with_credentials = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> StreamConfig {
        StreamConfig::new("http://x/a.m3u8")
            .with_cookie("sid=42")
            .with_user_agent("UA1")
            .with_referer("http://r")
            .with_origin("http://o")
    }

    #[test]
    fn test_direct_headers() {
        let mut request = PreparedRequest::new("http://x/a.m3u8");
        let applied = apply(&mut request, &full_config(), false);

        assert_eq!(applied, vec!["Cookie", "User-Agent", "Referer", "Origin"]);
        assert_eq!(request.header("cookie"), Some("sid=42"));
        assert_eq!(request.header("user-agent"), Some("UA1"));
        assert!(request.with_credentials);
    }

    #[test]
    fn test_proxied_headers_are_prefixed() {
        let mut request = PreparedRequest::new("https://proxy/?u");
        apply(&mut request, &full_config(), true);

        assert_eq!(request.header("x-forwarded-cookie"), Some("sid=42"));
        assert_eq!(request.header("x-forwarded-referer"), Some("http://r"));
        assert_eq!(request.header("x-forwarded-origin"), Some("http://o"));
        assert!(request.header("cookie").is_none());
    }

    #[test]
    fn test_default_user_agent_not_sent() {
        let config = StreamConfig::new("http://x").with_user_agent("Default");
        let mut request = PreparedRequest::new("http://x");
        assert!(apply(&mut request, &config, false).is_empty());
        assert!(!request.with_credentials);
    }

    #[test]
    fn test_rejected_header_does_not_abort_others() {
        let config = full_config().with_referer("bad\nvalue");
        let mut request = PreparedRequest::new("http://x");
        let applied = apply(&mut request, &config, false);

        assert_eq!(applied, vec!["Cookie", "User-Agent", "Origin"]);
        assert!(request.header("referer").is_none());
    }

    struct RefusingTransport {
        attempts: Vec<String>,
        credentials: bool,
    }

    impl RequestHeaders for RefusingTransport {
        fn set_header(&mut self, name: &str, _value: &str) -> Result<()> {
            self.attempts.push(name.to_string());
            Err(Error::HeaderRejected { name: name.to_string() })
        }

        fn set_with_credentials(&mut self, enabled: bool) {
            self.credentials = enabled;
        }
    }

    #[test]
    fn test_every_header_attempted_when_all_refused() {
        let mut transport = RefusingTransport {
            attempts: Vec::new(),
            credentials: false,
        };
        let applied = apply(&mut transport, &full_config(), true);

        assert!(applied.is_empty());
        assert_eq!(transport.attempts.len(), 4);
        assert!(transport.credentials);
    }
}
