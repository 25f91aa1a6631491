//! DRM key-system selection for the DASH engine
//!
//! Castway never performs license exchange itself. It only maps the
//! configured scheme to the EME key-system identifier and hands the license
//! server URL to the engine.

use crate::types::StreamConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Supported DRM schemes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrmScheme {
    #[default]
    Widevine,
    PlayReady,
    ClearKey,
}

impl DrmScheme {
    /// Parse a scheme name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "widevine" => Some(DrmScheme::Widevine),
            "playready" => Some(DrmScheme::PlayReady),
            "clearkey" => Some(DrmScheme::ClearKey),
            _ => None,
        }
    }

    /// Parse a scheme name, falling back to Widevine for unknown names
    pub fn parse(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!(scheme = name, "Unknown DRM scheme, using Widevine");
            DrmScheme::Widevine
        })
    }

    /// EME key-system identifier
    pub fn key_system(&self) -> &'static str {
        match self {
            DrmScheme::Widevine => "com.widevine.alpha",
            DrmScheme::PlayReady => "com.microsoft.playready",
            DrmScheme::ClearKey => "org.w3.clearkey",
        }
    }
}

impl std::fmt::Display for DrmScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrmScheme::Widevine => write!(f, "widevine"),
            DrmScheme::PlayReady => write!(f, "playready"),
            DrmScheme::ClearKey => write!(f, "clearkey"),
        }
    }
}

/// Protection data handed to the DASH engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionData {
    pub scheme: DrmScheme,
    pub key_system: String,
    pub server_url: String,
}

impl ProtectionData {
    pub fn new(scheme: DrmScheme, server_url: impl Into<String>) -> Self {
        Self {
            scheme,
            key_system: scheme.key_system().to_string(),
            server_url: server_url.into(),
        }
    }

    /// Build protection data from a stream request
    ///
    /// Requires a license URL. A missing scheme means Widevine.
    pub fn from_config(config: &StreamConfig) -> Option<Self> {
        let license_url = match config.drm_license_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url,
            _ => {
                if config.drm_scheme.is_some() {
                    warn!("DRM scheme set without a license URL, skipping protection data");
                }
                return None;
            }
        };

        let scheme = config
            .drm_scheme
            .as_deref()
            .map(DrmScheme::parse)
            .unwrap_or_default();

        Some(Self::new(scheme, license_url))
    }
}
