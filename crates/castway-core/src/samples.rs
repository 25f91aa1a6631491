//! Built-in sample streams

use crate::types::StreamConfig;
use serde::Serialize;

/// A playable sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleItem {
    pub title: &'static str,
    pub url: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drm_scheme: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drm_license_url: Option<&'static str>,
}

impl SampleItem {
    pub fn to_stream_config(&self) -> StreamConfig {
        let config = StreamConfig::new(self.url).with_title(self.title);
        match self.drm_license_url {
            Some(license_url) => config.with_drm(self.drm_scheme, license_url),
            None => config,
        }
    }
}

/// Named group of samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleCategory {
    pub title: &'static str,
    pub items: &'static [SampleItem],
}

const CATALOG: &[SampleCategory] = &[
    SampleCategory {
        title: "Clear DASH",
        items: &[SampleItem {
            title: "Big Buck Bunny (Clear)",
            url: "https://dash.akamaized.net/akamai/bbb_30fps/bbb_30fps.mpd",
            drm_scheme: None,
            drm_license_url: None,
        }],
    },
    SampleCategory {
        title: "Widevine DASH (MP4, H264)",
        items: &[SampleItem {
            title: "Sintel (Widevine)",
            url: "https://storage.googleapis.com/wvmedia/cenc/h264/tears/tears.mpd",
            drm_scheme: Some("widevine"),
            drm_license_url: Some("https://proxy.uat.widevine.com/proxy?provider=widevine_test"),
        }],
    },
    SampleCategory {
        title: "HLS",
        items: &[SampleItem {
            title: "Apple Basic Stream",
            url: "https://devstreaming-cdn.apple.com/videos/streaming/examples/img_bipbop_adv_example_ts/master.m3u8",
            drm_scheme: None,
            drm_license_url: None,
        }],
    },
    SampleCategory {
        title: "Progressive",
        items: &[SampleItem {
            title: "Big Buck Bunny (MP4)",
            url: "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4",
            drm_scheme: None,
            drm_license_url: None,
        }],
    },
];

pub fn catalog() -> &'static [SampleCategory] {
    CATALOG
}

/// Look up a sample by title, case-insensitively
pub fn find(title: &str) -> Option<&'static SampleItem> {
    CATALOG
        .iter()
        .flat_map(|category| category.items.iter())
        .find(|item| item.title.eq_ignore_ascii_case(title.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drm::ProtectionData;
    use crate::protocol::{classify, StreamProtocol};

    #[test]
    fn test_catalog_covers_each_protocol() {
        let protocols: Vec<_> = catalog()
            .iter()
            .flat_map(|c| c.items.iter())
            .map(|item| classify(item.url))
            .collect();
        assert!(protocols.contains(&StreamProtocol::Dash));
        assert!(protocols.contains(&StreamProtocol::Hls));
        assert!(protocols.contains(&StreamProtocol::Progressive));
    }

    #[test]
    fn test_widevine_sample_carries_license() {
        let config = find("sintel (widevine)").unwrap().to_stream_config();
        let data = ProtectionData::from_config(&config).unwrap();
        assert_eq!(data.key_system, "com.widevine.alpha");
        assert_eq!(config.title.as_deref(), Some("Sintel (Widevine)"));
    }

    #[test]
    fn test_clear_sample_has_no_drm() {
        let config = find("Big Buck Bunny (Clear)").unwrap().to_stream_config();
        assert!(config.drm_license_url.is_none());
        assert!(ProtectionData::from_config(&config).is_none());
    }
}
