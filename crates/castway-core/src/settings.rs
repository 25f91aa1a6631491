//! Persisted user settings
//!
//! Settings live in a string key-value store under three keys:
//! - `custom_playlists`: JSON array of [`ChannelEntry`] records
//! - `cors_proxy_enabled`: `"true"` / `"false"`
//! - `cors_proxy_url`: proxy template containing `{url}`
//!
//! [`Settings`] loads once from an injected [`SettingsStore`] and writes
//! every change straight back.

use crate::error::{Error, Result};
use crate::proxy::{validate_template, ProxyConfig, DEFAULT_PROXY_TEMPLATE};
use crate::types::{ChannelEntry, ChannelEntryPatch};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CUSTOM_PLAYLISTS_KEY: &str = "custom_playlists";
pub const PROXY_ENABLED_KEY: &str = "cors_proxy_enabled";
pub const PROXY_TEMPLATE_KEY: &str = "cors_proxy_url";

/// String key-value persistence
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a single JSON object file
///
/// A missing file reads as empty. The whole file is rewritten on every `set`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open the store at `path`, reading existing values if present
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Settings file not found, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        Ok(())
    }
}

/// Entries shipped before the user has saved anything
pub fn default_playlists() -> Vec<ChannelEntry> {
    (1..=3)
        .map(|n| {
            ChannelEntry::new(
                n.to_string(),
                format!("test{}", n),
                format!("http://localhost:8080/test{}", n),
            )
        })
        .collect()
}

/// Loaded settings bound to their store
pub struct Settings<S: SettingsStore> {
    store: S,
    proxy: ProxyConfig,
    custom_playlists: Vec<ChannelEntry>,
}

impl<S: SettingsStore> Settings<S> {
    /// Load settings, falling back to defaults for missing or corrupt values
    pub fn load(store: S) -> Result<Self> {
        let mut proxy = ProxyConfig::default();

        if let Some(enabled) = store.get(PROXY_ENABLED_KEY)? {
            proxy.enabled = enabled.trim() == "true";
        }
        if let Some(template) = store.get(PROXY_TEMPLATE_KEY)? {
            match validate_template(&template) {
                Ok(()) => proxy.template = template,
                Err(e) => warn!(error = %e, "Ignoring stored proxy template"),
            }
        }

        let custom_playlists = match store.get(CUSTOM_PLAYLISTS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Stored custom playlists are corrupt, using defaults");
                default_playlists()
            }),
            None => default_playlists(),
        };

        info!(
            proxy_enabled = proxy.enabled,
            custom_entries = custom_playlists.len(),
            "Settings loaded"
        );

        Ok(Self {
            store,
            proxy,
            custom_playlists,
        })
    }

    pub fn proxy(&self) -> &ProxyConfig {
        &self.proxy
    }

    pub fn custom_playlists(&self) -> &[ChannelEntry] {
        &self.custom_playlists
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn set_proxy_enabled(&mut self, enabled: bool) -> Result<()> {
        self.store
            .set(PROXY_ENABLED_KEY, if enabled { "true" } else { "false" })?;
        self.proxy.enabled = enabled;
        info!(enabled, "CORS proxy toggled");
        Ok(())
    }

    /// Replace the proxy template; it must contain `{url}`
    pub fn set_proxy_template(&mut self, template: &str) -> Result<()> {
        validate_template(template)?;
        self.store.set(PROXY_TEMPLATE_KEY, template)?;
        self.proxy.template = template.to_string();
        info!(template, "CORS proxy template updated");
        Ok(())
    }

    /// Restore the built-in proxy template
    pub fn reset_proxy_template(&mut self) -> Result<()> {
        self.set_proxy_template(DEFAULT_PROXY_TEMPLATE)
    }

    pub fn custom_playlist(&self, id: &str) -> Option<&ChannelEntry> {
        self.custom_playlists.iter().find(|entry| entry.id == id)
    }

    /// Append an entry to the custom list
    pub fn add_playlist(&mut self, entry: ChannelEntry) -> Result<()> {
        if entry.url.trim().is_empty() {
            return Err(Error::InvalidUrl(entry.url));
        }
        debug!(id = %entry.id, name = %entry.name, "Adding custom playlist entry");
        self.custom_playlists.push(entry);
        self.persist_playlists()
    }

    /// Merge `patch` into the entry with `id`; returns whether it existed
    pub fn update_playlist(&mut self, id: &str, patch: &ChannelEntryPatch) -> Result<bool> {
        let Some(entry) = self.custom_playlists.iter_mut().find(|entry| entry.id == id) else {
            return Ok(false);
        };
        patch.apply_to(entry);
        self.persist_playlists()?;
        Ok(true)
    }

    /// Remove the entry with `id`; returns whether it existed
    pub fn delete_playlist(&mut self, id: &str) -> Result<bool> {
        let before = self.custom_playlists.len();
        self.custom_playlists.retain(|entry| entry.id != id);
        if self.custom_playlists.len() == before {
            return Ok(false);
        }
        self.persist_playlists()?;
        Ok(true)
    }

    fn persist_playlists(&mut self) -> Result<()> {
        let encoded = serde_json::to_string(&self.custom_playlists)?;
        self.store.set(CUSTOM_PLAYLISTS_KEY, &encoded)
    }
}
