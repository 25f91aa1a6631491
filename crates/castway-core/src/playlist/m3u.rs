//! Extended M3U channel lists
//!
//! Format:
//! ```text
//! #EXTM3U
//! #EXTINF:-1 tvg-logo="http://x/l.png" group-title="News",Channel A
//! #EXTVLCOPT:http-referrer=http://r
//! http://x/a.m3u8|User-Agent=UA1&Cookie=sid%3D1
//! ```
//!
//! Directive lines accumulate into a pending record that the next stream URL
//! line finalizes. Per-record options (`#EXTVLCOPT`, pipe suffix) take
//! precedence over attributes from the `#EXTINF` line.

use super::{generate_entry_id, resolve_url, ParseSkip, SkipReason};
use crate::types::{ChannelEntry, DEFAULT_USER_AGENT, UNCATEGORIZED_GROUP, UNKNOWN_STREAM_NAME};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

const EXTINF: &str = "#EXTINF:";
const EXTVLCOPT: &str = "#EXTVLCOPT:";

static LOGO_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)tvg-logo=(?:"([^"]*)"|'([^']*)')"#).expect("valid regex"));
static GROUP_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)group-title=(?:"([^"]*)"|'([^']*)')"#).expect("valid regex"));
static USER_AGENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)user-agent=(?:"([^"]*)"|'([^']*)')"#).expect("valid regex"));

fn quoted_attribute(regex: &Regex, line: &str) -> Option<String> {
    let caps = regex.captures(line)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string())
}

/// Record being assembled from directive lines
#[derive(Debug, Default)]
struct PendingEntry {
    name: Option<String>,
    logo_url: Option<String>,
    group: Option<String>,
    /// From `#EXTINF` attributes
    directive_user_agent: Option<String>,
    /// From `#EXTVLCOPT` or pipe options
    option_user_agent: Option<String>,
    cookie: Option<String>,
    referer: Option<String>,
}

impl PendingEntry {
    fn apply_extinf(&mut self, line: &str) {
        let body = &line[EXTINF.len()..];
        self.name = body
            .rfind(',')
            .map(|idx| body[idx + 1..].trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        self.logo_url = quoted_attribute(&LOGO_REGEX, line);
        self.group = quoted_attribute(&GROUP_REGEX, line);
        if let Some(user_agent) = quoted_attribute(&USER_AGENT_REGEX, line) {
            self.directive_user_agent = Some(user_agent);
        }
    }

    fn apply_vlc_option(&mut self, line: &str) {
        let option = line[EXTVLCOPT.len()..].trim();
        let Some((key, value)) = option.split_once('=') else {
            return;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "http-user-agent" => self.option_user_agent = Some(value.to_string()),
            "http-referrer" => self.referer = Some(value.to_string()),
            other => trace!(option = other, "Ignoring VLC option"),
        }
    }

    /// Apply `key=value&key=value` options from a pipe suffix
    fn apply_pipe_options(&mut self, options: &str) -> Result<(), SkipReason> {
        for pair in options.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            if key.is_empty() || value.is_empty() {
                continue;
            }
            let key = key.trim().to_ascii_lowercase();
            let field = match key.as_str() {
                "user-agent" => &mut self.option_user_agent,
                "cookie" => &mut self.cookie,
                "referer" => &mut self.referer,
                _ => continue,
            };
            let decoded = urlencoding::decode(value).map_err(|_| SkipReason::MalformedOption(key.clone()))?;
            *field = Some(decoded.into_owned());
        }
        Ok(())
    }

    fn finish(self, url: String) -> ChannelEntry {
        ChannelEntry {
            id: generate_entry_id("m3u"),
            name: self.name.unwrap_or_else(|| UNKNOWN_STREAM_NAME.to_string()),
            url,
            logo_url: self.logo_url,
            group: Some(self.group.unwrap_or_else(|| UNCATEGORIZED_GROUP.to_string())),
            user_agent: self
                .option_user_agent
                .or(self.directive_user_agent)
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            cookie: self.cookie,
            referer: self.referer,
        }
    }
}

/// Parse extended M3U text
pub fn parse_m3u(text: &str, source_url: &str) -> (Vec<ChannelEntry>, Vec<ParseSkip>) {
    let mut entries = Vec::new();
    let mut skipped = Vec::new();
    let mut pending = PendingEntry::default();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }

        if line.starts_with(EXTINF) {
            pending.apply_extinf(line);
        } else if line.starts_with(EXTVLCOPT) {
            pending.apply_vlc_option(line);
        } else if line.starts_with('#') {
            continue;
        } else {
            let record = std::mem::take(&mut pending);
            match finish_record(record, line, source_url) {
                Ok(entry) => entries.push(entry),
                Err(reason) => skipped.push(ParseSkip::record(index + 1, reason)),
            }
        }
    }

    debug!(entries = entries.len(), skipped = skipped.len(), "M3U parsed");
    (entries, skipped)
}

fn finish_record(mut record: PendingEntry, line: &str, source_url: &str) -> Result<ChannelEntry, SkipReason> {
    let stream_url = match line.split_once('|') {
        Some((url, options)) => {
            record.apply_pipe_options(options)?;
            url.trim()
        }
        None => line,
    };

    if stream_url.is_empty() {
        return Err(SkipReason::MissingUrl);
    }

    Ok(record.finish(resolve_url(stream_url, source_url)))
}
