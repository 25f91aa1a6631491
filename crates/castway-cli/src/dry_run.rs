//! Scripted engines for `castway simulate`
//!
//! The engines record every call instead of touching the network, so the
//! orchestrator's retry and recovery decisions can be inspected offline.

use castway_core::{
    drm::ProtectionData, DashBackend, EngineErrorKind, EngineEvents, EngineProvider, HlsBackend, RenderSink,
    RequestPipeline,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Calls made by the scripted engines plus the live event handle
#[derive(Default)]
pub struct Recorder {
    pub calls: Vec<String>,
    pub events: Option<EngineEvents>,
}

pub type SharedRecorder = Rc<RefCell<Recorder>>;

fn record(recorder: &SharedRecorder, call: String) {
    recorder.borrow_mut().calls.push(call);
}

/// Event to inject, parsed from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedEvent {
    Ready,
    Fatal(EngineErrorKind),
}

impl std::str::FromStr for ScriptedEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ready" => Ok(ScriptedEvent::Ready),
            "network" => Ok(ScriptedEvent::Fatal(EngineErrorKind::Network)),
            "media" => Ok(ScriptedEvent::Fatal(EngineErrorKind::Media)),
            "other" => Ok(ScriptedEvent::Fatal(EngineErrorKind::Other)),
            other => Err(format!("unknown event '{}' (expected ready, network, media, other)", other)),
        }
    }
}

impl ScriptedEvent {
    /// Deliver through the most recently created engine
    pub fn emit(self, recorder: &SharedRecorder) -> bool {
        let Some(events) = recorder.borrow().events.clone() else {
            return false;
        };
        match self {
            ScriptedEvent::Ready => events.ready(),
            ScriptedEvent::Fatal(kind) => events.fatal(kind, "injected by simulate"),
        }
        true
    }
}

pub struct DryRunSink(pub SharedRecorder);

impl RenderSink for DryRunSink {
    fn set_source(&mut self, url: &str, events: EngineEvents) {
        record(&self.0, format!("sink: source {}", url));
        self.0.borrow_mut().events = Some(events);
    }

    fn play(&mut self) -> castway_core::Result<()> {
        record(&self.0, "sink: play".to_string());
        Ok(())
    }

    fn detach(&mut self) {
        record(&self.0, "sink: detach".to_string());
    }
}

struct DryRunHls {
    recorder: SharedRecorder,
    pipeline: RequestPipeline,
}

impl HlsBackend for DryRunHls {
    fn load_source(&mut self, url: &str) {
        let request = self.pipeline.prepare(url);
        let headers: Vec<_> = request.headers.keys().map(|name| name.as_str().to_string()).collect();
        record(
            &self.recorder,
            format!("hls: load {} headers=[{}]", request.url, headers.join(", ")),
        );
    }

    fn attach_media(&mut self, _sink: &mut dyn RenderSink) {
        record(&self.recorder, "hls: attach media".to_string());
    }

    fn start_load(&mut self) {
        record(&self.recorder, "hls: resume loading".to_string());
    }

    fn recover_media_error(&mut self) {
        record(&self.recorder, "hls: recover media error".to_string());
    }

    fn destroy(&mut self) {
        record(&self.recorder, "hls: destroy".to_string());
    }
}

struct DryRunDash {
    recorder: SharedRecorder,
    pipeline: RequestPipeline,
}

impl DashBackend for DryRunDash {
    fn set_protection_data(&mut self, data: &ProtectionData) {
        record(
            &self.recorder,
            format!("dash: protection {} -> {}", data.key_system, data.server_url),
        );
    }

    fn initialize(&mut self, _sink: &mut dyn RenderSink, url: &str, autoplay: bool) {
        let request = self.pipeline.prepare(url);
        record(
            &self.recorder,
            format!("dash: initialize {} autoplay={}", request.url, autoplay),
        );
    }

    fn recover(&mut self) {
        record(&self.recorder, "dash: recover".to_string());
    }

    fn reset(&mut self) {
        record(&self.recorder, "dash: reset".to_string());
    }
}

pub struct DryRunProvider {
    pub recorder: SharedRecorder,
    pub hls_supported: bool,
}

impl EngineProvider for DryRunProvider {
    fn hls_supported(&self) -> bool {
        self.hls_supported
    }

    fn create_hls(&mut self, pipeline: RequestPipeline, events: EngineEvents) -> Box<dyn HlsBackend> {
        self.recorder.borrow_mut().events = Some(events);
        Box::new(DryRunHls {
            recorder: Rc::clone(&self.recorder),
            pipeline,
        })
    }

    fn create_dash(&mut self, pipeline: RequestPipeline, events: EngineEvents) -> Box<dyn DashBackend> {
        self.recorder.borrow_mut().events = Some(events);
        Box::new(DryRunDash {
            recorder: Rc::clone(&self.recorder),
            pipeline,
        })
    }
}
