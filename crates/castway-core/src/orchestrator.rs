//! Playback Orchestrator - owns one playback session at a time
//!
//! Coordinates:
//! - Engine selection from the stream URL
//! - Proxy rewriting and header injection for the engine's requests
//! - The single automatic retry through the CORS proxy
//! - Teardown of superseded engines
//!
//! All methods run on one logical thread. Engines report back through an
//! event channel; each event carries the generation of the engine that sent
//! it and anything from an older generation is discarded.

use crate::{
    engine::{
        select_engine, Engine, EngineEnvelope, EngineErrorKind, EngineEvent, EngineEvents, EngineKind,
        EngineProvider, ErrorResolution, Generation, RenderSink, RequestPipeline,
        TROUBLESHOOTING_HINTS,
    },
    protocol::{classify, StreamProtocol},
    proxy::ProxyConfig,
    types::*,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

/// State of the active session
struct Session {
    id: SessionId,
    config: Arc<StreamConfig>,
    protocol: StreamProtocol,
    use_proxy: bool,
    retry: RetryState,
    auto_proxy_active: bool,
    engine: Option<Engine>,
}

/// Drives engines for the currently selected stream
pub struct PlaybackOrchestrator<P: EngineProvider, S: RenderSink> {
    provider: P,
    sink: S,
    proxy: ProxyConfig,
    state_tx: watch::Sender<PlaybackState>,
    events_tx: mpsc::UnboundedSender<EngineEnvelope>,
    events_rx: mpsc::UnboundedReceiver<EngineEnvelope>,
    generation: Generation,
    session: Option<Session>,
}

impl<P: EngineProvider, S: RenderSink> PlaybackOrchestrator<P, S> {
    /// Create an idle orchestrator
    pub fn new(provider: P, sink: S, proxy: ProxyConfig) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            provider,
            sink,
            proxy,
            state_tx,
            events_tx,
            events_rx,
            generation: Generation::default(),
            session: None,
        }
    }

    /// Current state
    pub fn state(&self) -> PlaybackState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    /// Generation of the live engine; events from other generations are stale
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn current_config(&self) -> Option<&StreamConfig> {
        self.session.as_ref().map(|s| s.config.as_ref())
    }

    pub fn current_protocol(&self) -> Option<StreamProtocol> {
        self.session.as_ref().map(|s| s.protocol)
    }

    pub fn engine_kind(&self) -> Option<EngineKind> {
        self.session
            .as_ref()
            .and_then(|s| s.engine.as_ref())
            .map(Engine::kind)
    }

    pub fn retry_state(&self) -> Option<RetryState> {
        self.session.as_ref().map(|s| s.retry)
    }

    /// Requests currently go through the proxy
    pub fn is_proxying(&self) -> bool {
        self.proxy.enabled || self.auto_proxy_active()
    }

    /// The automatic proxy escalation fired for this session
    pub fn auto_proxy_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.auto_proxy_active)
    }

    /// The active stream sends cookie headers
    pub fn cookie_headers_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.config.cookie.is_some())
    }

    /// Guidance to show next to a visible error
    pub fn troubleshooting_hints(&self) -> &'static [&'static str] {
        match self.state() {
            PlaybackState::Error { .. } => &TROUBLESHOOTING_HINTS,
            _ => &[],
        }
    }

    pub fn proxy(&self) -> &ProxyConfig {
        &self.proxy
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Start a new session, replacing any existing one
    #[instrument(skip(self, config), fields(url = %config.url))]
    pub fn play(&mut self, config: StreamConfig) {
        self.teardown_engine();

        let config = Arc::new(config);
        let protocol = classify(&config.url);
        let session = Session {
            id: SessionId::new(),
            config,
            protocol,
            use_proxy: self.proxy.enabled,
            retry: RetryState::default(),
            auto_proxy_active: false,
            engine: None,
        };
        info!(session_id = %session.id, protocol = %protocol, "Starting playback session");

        self.session = Some(session);
        self.initialize(self.proxy.enabled);
    }

    /// Close playback and detach from the sink
    #[instrument(skip(self))]
    pub fn close(&mut self) {
        self.teardown_engine();
        self.sink.detach();
        if let Some(session) = self.session.take() {
            info!(session_id = %session.id, "Playback closed");
        }
        self.set_state(PlaybackState::Destroyed);
    }

    /// Apply new proxy settings; an active session restarts with them
    pub fn update_proxy(&mut self, proxy: ProxyConfig) {
        if proxy == self.proxy {
            return;
        }
        info!(enabled = proxy.enabled, template = %proxy.template, "Proxy settings changed");
        self.proxy = proxy;

        let config = self
            .session
            .as_ref()
            .map(|session| session.config.as_ref().clone());
        if let Some(config) = config {
            self.play(config);
        }
    }

    /// Wait for the next engine event and handle it
    ///
    /// Returns `false` once no event can arrive anymore.
    pub async fn process_next(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(envelope) => {
                self.handle_event(envelope);
                true
            }
            None => false,
        }
    }

    /// Handle every event already queued, returning how many were read
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = self.events_rx.try_recv() {
            self.handle_event(envelope);
            handled += 1;
        }
        handled
    }

    /// Handle one engine event
    pub fn handle_event(&mut self, envelope: EngineEnvelope) {
        if envelope.generation != self.generation || self.session.is_none() {
            debug!(
                event_generation = %envelope.generation,
                live_generation = %self.generation,
                "Discarding stale engine event"
            );
            return;
        }

        match envelope.event {
            EngineEvent::Ready => self.on_ready(),
            EngineEvent::NonFatal { kind, details } => {
                debug!(kind = %kind, details = %details, "Non-fatal engine error");
            }
            EngineEvent::Fatal { kind, details } => self.on_fatal(kind, &details),
        }
    }

    fn on_ready(&mut self) {
        if let Some(engine) = self.session.as_mut().and_then(|s| s.engine.as_mut()) {
            engine.on_ready(&mut self.sink);
        }
        if matches!(self.state(), PlaybackState::Initializing { .. }) {
            self.set_state(PlaybackState::Playing);
        }
    }

    fn on_fatal(&mut self, kind: EngineErrorKind, details: &str) {
        let proxy_enabled = self.proxy.enabled;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(engine) = session.engine.as_mut() else {
            return;
        };

        warn!(
            session_id = %session.id,
            kind = %kind,
            details = %details,
            use_proxy = session.use_proxy,
            "Fatal engine error"
        );

        let can_escalate = kind == EngineErrorKind::Network
            && !session.use_proxy
            && !proxy_enabled
            && session.retry.take_proxy_fallback();

        match engine.on_fatal_error(kind, can_escalate) {
            ErrorResolution::EscalateToProxy => {
                session.auto_proxy_active = true;
                info!(session_id = %session.id, "Retrying through the CORS proxy");
                self.initialize(true);
            }
            ErrorResolution::Recovered => {
                info!(session_id = %session.id, "Attempted in-engine media recovery");
            }
            ErrorResolution::Surface(message) => {
                self.set_state(PlaybackState::Error { message });
            }
            ErrorResolution::Fatal(message) => {
                engine.destroy();
                session.engine = None;
                self.generation = self.generation.next();
                self.set_state(PlaybackState::Error { message });
            }
        }
    }

    /// Build and start the engine for the active session
    fn initialize(&mut self, use_proxy: bool) {
        self.teardown_engine();

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.use_proxy = use_proxy;

        let kind = select_engine(session.protocol, self.provider.hls_supported());
        let pipeline = RequestPipeline::new(Arc::clone(&session.config), self.proxy.template.clone(), use_proxy);
        let events = EngineEvents::new(self.generation, self.events_tx.clone());

        info!(
            session_id = %session.id,
            engine = %kind,
            generation = %self.generation,
            use_proxy,
            "Initializing engine"
        );

        let engine = Engine::initialize(kind, &mut self.provider, &mut self.sink, pipeline, events);
        session.engine = Some(engine);

        self.set_state(PlaybackState::Initializing { use_proxy });
    }

    /// Destroy the live engine and invalidate its generation
    fn teardown_engine(&mut self) {
        if let Some(mut engine) = self.session.as_mut().and_then(|s| s.engine.take()) {
            debug!(engine = %engine.kind(), generation = %self.generation, "Destroying engine");
            engine.destroy();
        }
        self.generation = self.generation.next();
    }

    fn set_state(&self, new_state: PlaybackState) {
        let current = self.state();
        info!(from = %current, to = %new_state, "State transition");
        self.state_tx.send_replace(new_state);
    }
}

impl<P: EngineProvider, S: RenderSink> Drop for PlaybackOrchestrator<P, S> {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drm::ProtectionData;
    use crate::engine::{DashBackend, HlsBackend};
    use crate::error::{Error, Result};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct TestSink {
        log: Log,
        events: Option<EngineEvents>,
    }

    impl RenderSink for TestSink {
        fn set_source(&mut self, url: &str, events: EngineEvents) {
            self.log.borrow_mut().push(format!("sink.src {}", url));
            self.events = Some(events);
        }

        fn play(&mut self) -> Result<()> {
            self.log.borrow_mut().push("sink.play".to_string());
            Ok(())
        }

        fn detach(&mut self) {
            self.log.borrow_mut().push("sink.detach".to_string());
        }
    }

    struct TestHls {
        log: Log,
    }

    impl HlsBackend for TestHls {
        fn load_source(&mut self, url: &str) {
            self.log.borrow_mut().push(format!("hls.load {}", url));
        }
        fn attach_media(&mut self, _sink: &mut dyn RenderSink) {
            self.log.borrow_mut().push("hls.attach".to_string());
        }
        fn start_load(&mut self) {
            self.log.borrow_mut().push("hls.start_load".to_string());
        }
        fn recover_media_error(&mut self) {
            self.log.borrow_mut().push("hls.recover".to_string());
        }
        fn destroy(&mut self) {
            self.log.borrow_mut().push("hls.destroy".to_string());
        }
    }

    struct TestDash {
        log: Log,
    }

    impl DashBackend for TestDash {
        fn set_protection_data(&mut self, data: &ProtectionData) {
            self.log.borrow_mut().push(format!("dash.drm {}", data.key_system));
        }
        fn initialize(&mut self, _sink: &mut dyn RenderSink, url: &str, autoplay: bool) {
            self.log.borrow_mut().push(format!("dash.init {} {}", url, autoplay));
        }
        fn recover(&mut self) {
            self.log.borrow_mut().push("dash.recover".to_string());
        }
        fn reset(&mut self) {
            self.log.borrow_mut().push("dash.reset".to_string());
        }
    }

    struct TestProvider {
        log: Log,
        events: Vec<EngineEvents>,
        pipelines: Vec<RequestPipeline>,
    }

    impl EngineProvider for TestProvider {
        fn hls_supported(&self) -> bool {
            true
        }

        fn create_hls(&mut self, pipeline: RequestPipeline, events: EngineEvents) -> Box<dyn HlsBackend> {
            self.pipelines.push(pipeline);
            self.events.push(events);
            Box::new(TestHls { log: Rc::clone(&self.log) })
        }

        fn create_dash(&mut self, pipeline: RequestPipeline, events: EngineEvents) -> Box<dyn DashBackend> {
            self.pipelines.push(pipeline);
            self.events.push(events);
            Box::new(TestDash { log: Rc::clone(&self.log) })
        }
    }

    fn orchestrator(proxy_enabled: bool) -> (PlaybackOrchestrator<TestProvider, TestSink>, Log) {
        let log: Log = Rc::default();
        let provider = TestProvider {
            log: Rc::clone(&log),
            events: Vec::new(),
            pipelines: Vec::new(),
        };
        let sink = TestSink {
            log: Rc::clone(&log),
            events: None,
        };
        let proxy = ProxyConfig::new(proxy_enabled, "https://corsproxy.io/?{url}");
        (PlaybackOrchestrator::new(provider, sink, proxy), log)
    }

    fn last_events(orch: &PlaybackOrchestrator<TestProvider, TestSink>) -> EngineEvents {
        orch.provider().events.last().cloned().unwrap()
    }

    #[test]
    fn test_starts_idle() {
        let (orch, _) = orchestrator(false);
        assert_eq!(orch.state(), PlaybackState::Idle);
        assert!(orch.session_id().is_none());
    }

    #[test]
    fn test_hls_session_reaches_playing() {
        let (mut orch, log) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/live.m3u8"));

        assert_eq!(orch.state(), PlaybackState::Initializing { use_proxy: false });
        assert_eq!(orch.engine_kind(), Some(EngineKind::Hls));

        last_events(&orch).ready();
        assert_eq!(orch.drain_events(), 1);
        assert_eq!(orch.state(), PlaybackState::Playing);
        assert!(log.borrow().contains(&"sink.play".to_string()));
    }

    #[test]
    fn test_network_error_escalates_once() {
        let (mut orch, log) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/live.m3u8"));

        last_events(&orch).fatal(EngineErrorKind::Network, "cors");
        orch.drain_events();

        assert_eq!(orch.state(), PlaybackState::Initializing { use_proxy: true });
        assert!(orch.auto_proxy_active());
        assert!(orch.is_proxying());
        assert!(orch.retry_state().unwrap().attempted_proxy_fallback);
        assert!(orch.provider().pipelines.last().unwrap().is_proxied());
        assert!(log.borrow().contains(&"hls.destroy".to_string()));

        last_events(&orch).fatal(EngineErrorKind::Network, "still failing");
        orch.drain_events();

        assert_eq!(orch.provider().events.len(), 2);
        assert_eq!(orch.state().error_message(), Some(crate::engine::NETWORK_ERROR_MESSAGE));
        assert_eq!(orch.troubleshooting_hints().len(), 3);
        assert_eq!(log.borrow().last().map(String::as_str), Some("hls.start_load"));
    }

    #[test]
    fn test_late_error_from_replaced_engine_is_discarded() {
        let (mut orch, log) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/live.m3u8"));
        let direct = last_events(&orch);

        direct.fatal(EngineErrorKind::Network, "cors");
        orch.drain_events();
        assert_eq!(orch.provider().events.len(), 2);

        direct.fatal(EngineErrorKind::Network, "cors again");
        assert_eq!(orch.drain_events(), 1);

        assert_eq!(orch.provider().events.len(), 2);
        assert_eq!(orch.state(), PlaybackState::Initializing { use_proxy: true });
        assert_eq!(orch.engine_kind(), Some(EngineKind::Hls));
        assert_eq!(log.borrow().iter().filter(|l| *l == "hls.destroy").count(), 1);
    }

    #[test]
    fn test_media_error_keeps_escalation_available() {
        let (mut orch, _) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/live.m3u8"));

        last_events(&orch).fatal(EngineErrorKind::Media, "decode");
        orch.drain_events();
        assert!(!orch.retry_state().unwrap().attempted_proxy_fallback);

        last_events(&orch).fatal(EngineErrorKind::Network, "cors");
        orch.drain_events();
        assert_eq!(orch.state(), PlaybackState::Initializing { use_proxy: true });
    }

    #[test]
    fn test_no_escalation_when_proxy_enabled() {
        let (mut orch, _) = orchestrator(true);
        orch.play(StreamConfig::new("http://x/manifest.mpd"));
        assert_eq!(orch.state(), PlaybackState::Initializing { use_proxy: true });

        last_events(&orch).fatal(EngineErrorKind::Network, "download");
        orch.drain_events();

        assert_eq!(orch.provider().events.len(), 1);
        assert_eq!(
            orch.state().error_message(),
            Some(crate::engine::DASH_DOWNLOAD_ERROR_MESSAGE)
        );
        assert!(!orch.auto_proxy_active());
    }

    #[test]
    fn test_stale_events_ignored() {
        let (mut orch, _) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/old.m3u8"));
        let old_events = last_events(&orch);

        orch.play(StreamConfig::new("http://x/new.m3u8"));
        old_events.fatal(EngineErrorKind::Network, "late failure");
        old_events.ready();
        orch.drain_events();

        assert_eq!(orch.state(), PlaybackState::Initializing { use_proxy: false });
        assert!(!orch.auto_proxy_active());
        assert_eq!(orch.provider().events.len(), 2);
    }

    #[test]
    fn test_new_session_rearms_fallback() {
        let (mut orch, _) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/a.m3u8"));
        last_events(&orch).fatal(EngineErrorKind::Network, "cors");
        orch.drain_events();
        assert!(orch.auto_proxy_active());

        orch.play(StreamConfig::new("http://x/b.m3u8"));
        assert!(!orch.auto_proxy_active());
        assert!(!orch.retry_state().unwrap().attempted_proxy_fallback);

        last_events(&orch).fatal(EngineErrorKind::Network, "cors");
        orch.drain_events();
        assert_eq!(orch.state(), PlaybackState::Initializing { use_proxy: true });
    }

    #[test]
    fn test_media_errors_always_recover_in_engine() {
        let (mut orch, log) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/a.m3u8"));
        let events = last_events(&orch);

        events.ready();
        events.fatal(EngineErrorKind::Media, "bufferAppendError");
        events.fatal(EngineErrorKind::Media, "bufferAppendError");
        assert_eq!(orch.drain_events(), 3);

        assert_eq!(orch.state(), PlaybackState::Playing);
        assert_eq!(orch.engine_kind(), Some(EngineKind::Hls));
        assert!(!orch.retry_state().unwrap().attempted_proxy_fallback);
        let log = log.borrow();
        assert_eq!(log.iter().filter(|l| *l == "hls.recover").count(), 2);
        assert!(!log.contains(&"hls.destroy".to_string()));
    }

    #[test]
    fn test_dash_media_error_recovers() {
        let (mut orch, log) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/a.mpd"));

        last_events(&orch).fatal(EngineErrorKind::Media, "decode");
        last_events(&orch).fatal(EngineErrorKind::Media, "decode");
        orch.drain_events();

        assert_eq!(orch.state(), PlaybackState::Initializing { use_proxy: false });
        assert_eq!(log.borrow().iter().filter(|l| *l == "dash.recover").count(), 2);
    }

    #[test]
    fn test_other_error_destroys_engine() {
        let (mut orch, log) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/a.m3u8"));
        let events = last_events(&orch);

        events.fatal(EngineErrorKind::Other, "internal");
        orch.drain_events();
        assert_eq!(orch.engine_kind(), None);
        assert!(log.borrow().contains(&"hls.destroy".to_string()));

        // The destroyed engine can no longer move the session.
        events.ready();
        orch.drain_events();
        assert!(orch.state().error_message().is_some());
    }

    #[test]
    fn test_dash_drm_applied() {
        let (mut orch, log) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/a.mpd").with_drm(Some("clearkey"), "https://lic"));

        let log = log.borrow();
        assert!(log.contains(&"dash.drm org.w3.clearkey".to_string()));
        assert!(log.contains(&"dash.init http://x/a.mpd true".to_string()));
    }

    #[test]
    fn test_progressive_uses_sink_directly() {
        let (mut orch, log) = orchestrator(true);
        orch.play(StreamConfig::new("http://x/movie.mp4"));

        assert_eq!(orch.engine_kind(), Some(EngineKind::Native));
        let log = log.borrow();
        assert_eq!(log[0], "sink.src https://corsproxy.io/?http%3A%2F%2Fx%2Fmovie.mp4");
        assert_eq!(log[1], "sink.play");
    }

    #[test]
    fn test_close_detaches_and_ignores_late_events() {
        let (mut orch, log) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/a.m3u8").with_cookie("sid=1"));
        assert!(orch.cookie_headers_active());
        let events = last_events(&orch);

        orch.close();
        assert_eq!(orch.state(), PlaybackState::Destroyed);
        assert!(log.borrow().contains(&"sink.detach".to_string()));
        assert!(!orch.cookie_headers_active());

        events.fatal(EngineErrorKind::Network, "late");
        orch.drain_events();
        assert_eq!(orch.state(), PlaybackState::Destroyed);
    }

    #[test]
    fn test_proxy_update_restarts_session() {
        let (mut orch, _) = orchestrator(false);
        orch.play(StreamConfig::new("http://x/a.m3u8"));
        let first = orch.session_id();

        orch.update_proxy(ProxyConfig::new(true, "https://relay.local/?u={url}"));
        assert_ne!(orch.session_id(), first);
        assert_eq!(orch.state(), PlaybackState::Initializing { use_proxy: true });
        assert_eq!(
            orch.provider().pipelines.last().unwrap().rewrite_url("http://x/a.m3u8"),
            "https://relay.local/?u=http%3A%2F%2Fx%2Fa.m3u8"
        );
    }

    #[test]
    fn test_refused_autoplay_is_not_an_error() {
        struct RefusingSink;
        impl RenderSink for RefusingSink {
            fn set_source(&mut self, _url: &str, _events: EngineEvents) {}
            fn play(&mut self) -> Result<()> {
                Err(Error::Engine("autoplay blocked".to_string()))
            }
            fn detach(&mut self) {}
        }

        let provider = TestProvider {
            log: Rc::default(),
            events: Vec::new(),
            pipelines: Vec::new(),
        };
        let mut orch = PlaybackOrchestrator::new(provider, RefusingSink, ProxyConfig::new(false, "{url}"));
        orch.play(StreamConfig::new("http://x/movie.mp4"));
        assert_eq!(orch.state(), PlaybackState::Initializing { use_proxy: false });
    }

    #[tokio::test]
    async fn test_process_next_handles_event() {
        let (mut orch, _) = orchestrator(false);
        let mut states = orch.subscribe_state();
        orch.play(StreamConfig::new("http://x/a.m3u8"));

        last_events(&orch).ready();
        assert!(orch.process_next().await);
        assert_eq!(*states.borrow_and_update(), PlaybackState::Playing);
    }
}
