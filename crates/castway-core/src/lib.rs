//! Castway Core - Stream playback orchestration
//!
//! This crate provides the core functionality for playing user-supplied streams:
//! - JSON and extended M3U channel-list parsing
//! - Playlist fetching, optionally through a CORS proxy
//! - Protocol classification and engine selection (DASH, HLS, native)
//! - Request URL rewriting and header injection for the engines
//! - DRM key-system selection
//! - The one-shot automatic proxy retry
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Castway Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Playlist   │  │   Settings   │  │   Samples    │           │
//! │  │    Loader    │  │    Store     │  │   Catalog    │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │    StreamConfig │ ProxyConfig     │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │                              │
//! │                    │Orchestrator │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │  Classifier  │  │   Engine    │  │ Proxy + Hdr  │            │
//! │  │              │  │ HLS|DASH|Nat│  │   Pipeline   │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod drm;
pub mod engine;
pub mod error;
pub mod headers;
pub mod orchestrator;
pub mod playlist;
pub mod protocol;
pub mod proxy;
pub mod samples;
pub mod settings;
pub mod types;

pub use drm::{DrmScheme, ProtectionData};
pub use engine::{
    DashBackend, Engine, EngineErrorKind, EngineEvent, EngineEvents, EngineKind, EngineProvider, HlsBackend,
    RenderSink, RequestPipeline,
};
pub use error::{Error, Result};
pub use headers::{PreparedRequest, RequestHeaders};
pub use orchestrator::PlaybackOrchestrator;
pub use playlist::{filter_entries, parse, LoaderConfig, PlaylistLoader};
pub use protocol::{classify, StreamProtocol};
pub use proxy::ProxyConfig;
pub use settings::{JsonFileStore, MemoryStore, Settings, SettingsStore};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
pub fn init() {
    tracing::info!(version = VERSION, "Castway Core initialized");
}
