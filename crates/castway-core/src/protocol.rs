//! Stream protocol classification
//!
//! Selection is a substring heuristic over the URL, not a content probe.
//! Extensionless URLs (dynamic channel endpoints) are treated as HLS, so a
//! plain file served without a `.mp4`/`.mkv` extension is misclassified.

use serde::{Deserialize, Serialize};

/// Playback engine family for a stream URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    Dash,
    Hls,
    Progressive,
}

impl std::fmt::Display for StreamProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamProtocol::Dash => write!(f, "DASH"),
            StreamProtocol::Hls => write!(f, "HLS"),
            StreamProtocol::Progressive => write!(f, "PROGRESSIVE"),
        }
    }
}

/// Classify a resolved stream URL
pub fn classify(url: &str) -> StreamProtocol {
    if url.contains(".mpd") || url.contains("mpd=") {
        return StreamProtocol::Dash;
    }
    if url.contains(".m3u8") || url.contains("m3u8=") {
        return StreamProtocol::Hls;
    }
    if !url.contains(".mp4") && !url.contains(".mkv") {
        return StreamProtocol::Hls;
    }
    StreamProtocol::Progressive
}
