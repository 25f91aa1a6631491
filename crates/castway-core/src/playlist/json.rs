//! JSON channel-list records
//!
//! Channel lists published as JSON use inconsistent key names. Each field is
//! read from the first alias holding a non-empty value.

use super::{generate_entry_id, resolve_url, ParseSkip, SkipReason};
use crate::types::{ChannelEntry, DEFAULT_USER_AGENT, UNCATEGORIZED_GROUP, UNKNOWN_STREAM_NAME};
use serde_json::{Map, Value};

const NAME_KEYS: &[&str] = &["name", "title"];
const URL_KEYS: &[&str] = &["link", "url"];
const LOGO_KEYS: &[&str] = &["logo", "icon"];
const GROUP_KEYS: &[&str] = &["category", "group"];
const USER_AGENT_KEYS: &[&str] = &["user_agent", "userAgent", "user-agent"];
const COOKIE_KEYS: &[&str] = &["cookie", "cookies"];
const REFERER_KEYS: &[&str] = &["referer", "referrer"];

/// First alias whose value is a non-empty string or a number
fn first_present(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match record.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Normalize one JSON record
pub fn normalize_record(record: &Value, source_url: &str) -> Result<ChannelEntry, SkipReason> {
    let record = record.as_object().ok_or(SkipReason::NotAnObject)?;
    let url = first_present(record, URL_KEYS).ok_or(SkipReason::MissingUrl)?;

    Ok(ChannelEntry {
        id: generate_entry_id("json"),
        name: first_present(record, NAME_KEYS).unwrap_or_else(|| UNKNOWN_STREAM_NAME.to_string()),
        url: resolve_url(&url, source_url),
        logo_url: first_present(record, LOGO_KEYS),
        group: Some(first_present(record, GROUP_KEYS).unwrap_or_else(|| UNCATEGORIZED_GROUP.to_string())),
        user_agent: first_present(record, USER_AGENT_KEYS).unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        cookie: first_present(record, COOKIE_KEYS),
        referer: first_present(record, REFERER_KEYS),
    })
}

/// Normalize every element of a JSON array, dropping unusable ones
pub fn parse_json_records(records: &[Value], source_url: &str) -> (Vec<ChannelEntry>, Vec<ParseSkip>) {
    let mut entries = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match normalize_record(record, source_url) {
            Ok(entry) => entries.push(entry),
            Err(reason) => skipped.push(ParseSkip::record(index, reason)),
        }
    }

    (entries, skipped)
}
