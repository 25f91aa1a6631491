//! Streaming engine seam
//!
//! The HLS and DASH engines and the video surface are external capability
//! providers. This module defines the surface castway drives them through:
//!
//! ```text
//!   EngineProvider ──creates──▶ HlsBackend / DashBackend
//!        │                            │  request hooks: RequestPipeline
//!        │                            │  callbacks:     EngineEvents
//!        ▼                            ▼
//!   Engine (Hls | Dash | Native) ──attaches──▶ RenderSink
//! ```
//!
//! Every callback carries the [`Generation`] it was created for, so events
//! from a torn-down engine can be recognised and dropped.

use crate::drm::ProtectionData;
use crate::error::Result;
use crate::headers::{self, PreparedRequest, RequestHeaders};
use crate::protocol::StreamProtocol;
use crate::proxy;
use crate::types::StreamConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Shown when the stream cannot be reached even through the proxy
pub const NETWORK_ERROR_MESSAGE: &str =
    "Network error encountered. The stream might be blocking web playback (CORS) or the proxy failed.";

/// Shown when DASH segment downloads keep failing
pub const DASH_DOWNLOAD_ERROR_MESSAGE: &str =
    "DASH stream download failed. The network might be rejecting the proxy or the link is expired.";

/// Shown for unrecoverable engine failures
pub const FATAL_ERROR_MESSAGE: &str = "Fatal error loading stream.";

/// Guidance displayed alongside a playback error
pub const TROUBLESHOOTING_HINTS: [&str; 3] = [
    "The stream link might be expired or geo-blocked.",
    "The CORS proxy may be rejecting the connection.",
    "Check if the stream requires valid Cookie/Referer values.",
];

/// Monotonic tag identifying one engine initialization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error classes engines report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// Manifest or segment could not be fetched
    Network,
    /// Decode or media pipeline failure
    Media,
    /// Anything else
    Other,
}

impl std::fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineErrorKind::Network => write!(f, "network"),
            EngineErrorKind::Media => write!(f, "media"),
            EngineErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Lifecycle events emitted by engines and the render sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Manifest parsed or metadata loaded
    Ready,
    /// Error the engine cannot get past on its own
    Fatal { kind: EngineErrorKind, details: String },
    /// Error the engine is already handling
    NonFatal { kind: EngineErrorKind, details: String },
}

/// An event tagged with the engine generation that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEnvelope {
    pub generation: Generation,
    pub event: EngineEvent,
}

/// Callback handle given to one engine instance
#[derive(Debug, Clone)]
pub struct EngineEvents {
    generation: Generation,
    tx: mpsc::UnboundedSender<EngineEnvelope>,
}

impl EngineEvents {
    pub(crate) fn new(generation: Generation, tx: mpsc::UnboundedSender<EngineEnvelope>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Deliver an event; silently dropped once the orchestrator is gone
    pub fn emit(&self, event: EngineEvent) {
        if self
            .tx
            .send(EngineEnvelope {
                generation: self.generation,
                event,
            })
            .is_err()
        {
            debug!(generation = %self.generation, "Engine event after orchestrator shutdown");
        }
    }

    pub fn ready(&self) {
        self.emit(EngineEvent::Ready);
    }

    pub fn fatal(&self, kind: EngineErrorKind, details: impl Into<String>) {
        self.emit(EngineEvent::Fatal {
            kind,
            details: details.into(),
        });
    }

    pub fn non_fatal(&self, kind: EngineErrorKind, details: impl Into<String>) {
        self.emit(EngineEvent::NonFatal {
            kind,
            details: details.into(),
        });
    }
}

/// Request hooks installed into an engine's loader
///
/// Engines call [`RequestPipeline::rewrite_url`] for every manifest, segment
/// and license request and [`RequestPipeline::apply_headers`] on the request
/// object before it is sent.
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    config: Arc<StreamConfig>,
    proxy_template: String,
    use_proxy: bool,
}

impl RequestPipeline {
    pub fn new(config: Arc<StreamConfig>, proxy_template: impl Into<String>, use_proxy: bool) -> Self {
        Self {
            config,
            proxy_template: proxy_template.into(),
            use_proxy,
        }
    }

    pub fn is_proxied(&self) -> bool {
        self.use_proxy
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// URL actually sent to the network
    pub fn rewrite_url(&self, url: &str) -> String {
        proxy::rewrite(url, self.use_proxy, &self.proxy_template)
    }

    /// Attach the stream's headers, prefixed when proxied
    pub fn apply_headers<R>(&self, request: &mut R) -> Vec<String>
    where
        R: RequestHeaders + ?Sized,
    {
        headers::apply(request, &self.config, self.use_proxy)
    }

    /// Rewrite and decorate a request in one step
    pub fn prepare(&self, url: &str) -> PreparedRequest {
        let mut request = PreparedRequest::new(self.rewrite_url(url));
        self.apply_headers(&mut request);
        request
    }
}

/// Video surface playback is rendered to
pub trait RenderSink {
    /// Assign a source URL directly; `events` reports metadata and errors
    fn set_source(&mut self, url: &str, events: EngineEvents);

    /// Start playback; the surface may refuse autoplay
    fn play(&mut self) -> Result<()>;

    /// Drop the current source and reset the surface
    fn detach(&mut self);
}

/// HLS engine capability
pub trait HlsBackend {
    fn load_source(&mut self, url: &str);
    fn attach_media(&mut self, sink: &mut dyn RenderSink);
    /// Resume loading after a network failure
    fn start_load(&mut self);
    fn recover_media_error(&mut self);
    fn destroy(&mut self);
}

/// DASH engine capability
pub trait DashBackend {
    fn set_protection_data(&mut self, data: &ProtectionData);
    fn initialize(&mut self, sink: &mut dyn RenderSink, url: &str, autoplay: bool);
    /// Re-establish the media pipeline after a decode failure
    fn recover(&mut self);
    fn reset(&mut self);
}

/// Factory for engine instances
pub trait EngineProvider {
    /// Whether an HLS engine can run in this environment
    fn hls_supported(&self) -> bool;

    fn create_hls(&mut self, pipeline: RequestPipeline, events: EngineEvents) -> Box<dyn HlsBackend>;

    fn create_dash(&mut self, pipeline: RequestPipeline, events: EngineEvents) -> Box<dyn DashBackend>;
}

/// Engine variant actually driving playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Hls,
    Dash,
    Native,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Hls => write!(f, "hls"),
            EngineKind::Dash => write!(f, "dash"),
            EngineKind::Native => write!(f, "native"),
        }
    }
}

/// Engine selection for a protocol given the provider's capabilities
pub fn select_engine(protocol: StreamProtocol, hls_supported: bool) -> EngineKind {
    match protocol {
        StreamProtocol::Dash => EngineKind::Dash,
        StreamProtocol::Hls if hls_supported => EngineKind::Hls,
        StreamProtocol::Hls | StreamProtocol::Progressive => EngineKind::Native,
    }
}

/// Outcome of a fatal engine error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorResolution {
    /// Reinitialize the session through the proxy
    EscalateToProxy,
    /// The engine attempted its internal recovery
    Recovered,
    /// Show the message; the engine stays alive
    Surface(String),
    /// Destroy the engine and show the message
    Fatal(String),
}

/// A live engine instance
pub enum Engine {
    Hls(Box<dyn HlsBackend>),
    Dash(Box<dyn DashBackend>),
    /// Source assigned straight to the sink
    Native { play_on_metadata: bool },
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Engine::Hls(_) => f.write_str("Engine::Hls"),
            Engine::Dash(_) => f.write_str("Engine::Dash"),
            Engine::Native { play_on_metadata } => f
                .debug_struct("Engine::Native")
                .field("play_on_metadata", play_on_metadata)
                .finish(),
        }
    }
}

impl Engine {
    /// Construct the engine for `kind`, wire its hooks and begin loading
    pub fn initialize(
        kind: EngineKind,
        provider: &mut dyn EngineProvider,
        sink: &mut dyn RenderSink,
        pipeline: RequestPipeline,
        events: EngineEvents,
    ) -> Engine {
        let config = Arc::clone(&pipeline.config);
        let source = config.url.as_str();

        match kind {
            EngineKind::Dash => {
                let mut dash = provider.create_dash(pipeline, events);
                if let Some(data) = ProtectionData::from_config(&config) {
                    info!(key_system = %data.key_system, "Applying DRM protection data");
                    dash.set_protection_data(&data);
                }
                dash.initialize(sink, source, true);
                Engine::Dash(dash)
            }
            EngineKind::Hls => {
                let mut hls = provider.create_hls(pipeline, events);
                hls.load_source(source);
                hls.attach_media(sink);
                Engine::Hls(hls)
            }
            EngineKind::Native => {
                let play_on_metadata = source.contains(".m3u8");
                sink.set_source(&pipeline.rewrite_url(source), events);
                if !play_on_metadata {
                    start_playback(sink);
                }
                Engine::Native { play_on_metadata }
            }
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            Engine::Hls(_) => EngineKind::Hls,
            Engine::Dash(_) => EngineKind::Dash,
            Engine::Native { .. } => EngineKind::Native,
        }
    }

    /// React to the engine becoming ready
    pub fn on_ready(&mut self, sink: &mut dyn RenderSink) {
        match self {
            Engine::Hls(_) | Engine::Native { play_on_metadata: true } => start_playback(sink),
            // DASH autoplays; native non-HLS sources were started on assignment.
            Engine::Dash(_) | Engine::Native { play_on_metadata: false } => {}
        }
    }

    /// Decide how a fatal error is handled and run the engine-side part
    ///
    /// `can_escalate` is true when the session's one-shot proxy retry has
    /// been granted for this error. Media errors on HLS and DASH always go
    /// to the engine's own recovery and never change playback state.
    pub fn on_fatal_error(&mut self, kind: EngineErrorKind, can_escalate: bool) -> ErrorResolution {
        match kind {
            EngineErrorKind::Network if can_escalate => ErrorResolution::EscalateToProxy,
            EngineErrorKind::Network => match self {
                Engine::Hls(hls) => {
                    hls.start_load();
                    ErrorResolution::Surface(NETWORK_ERROR_MESSAGE.to_string())
                }
                Engine::Dash(_) => ErrorResolution::Surface(DASH_DOWNLOAD_ERROR_MESSAGE.to_string()),
                Engine::Native { .. } => ErrorResolution::Surface(NETWORK_ERROR_MESSAGE.to_string()),
            },
            EngineErrorKind::Media => match self {
                Engine::Hls(hls) => {
                    hls.recover_media_error();
                    ErrorResolution::Recovered
                }
                Engine::Dash(dash) => {
                    dash.recover();
                    ErrorResolution::Recovered
                }
                // The sink has no recovery hook of its own.
                Engine::Native { .. } => ErrorResolution::Fatal(FATAL_ERROR_MESSAGE.to_string()),
            },
            EngineErrorKind::Other => ErrorResolution::Fatal(FATAL_ERROR_MESSAGE.to_string()),
        }
    }

    /// Release everything the engine acquired
    pub fn destroy(&mut self) {
        match self {
            Engine::Hls(hls) => hls.destroy(),
            Engine::Dash(dash) => dash.reset(),
            Engine::Native { .. } => {}
        }
    }
}

fn start_playback(sink: &mut dyn RenderSink) {
    if let Err(e) = sink.play() {
        warn!(error = %e, "Auto-play prevented by the render sink");
    }
}
