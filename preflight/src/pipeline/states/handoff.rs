//! Final leg: content preload and the scene handoff.

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::pipeline::machine::PipelineServices;
use crate::pipeline::state::{PipelineState, SceneRequest, Transition};
use crate::services::PreloadEvent;

/// Preload startup content before handing the application its first scene.
///
/// The expected item count comes back from `begin_preload`; an empty
/// preload set completes on the first poll. A single failed item stalls
/// the pipeline, partial preloads are not handed off.
pub struct Preload {
    events: Option<Receiver<PreloadEvent>>,
    expected: usize,
    loaded: usize,
}

impl Preload {
    pub fn new() -> Self {
        Self {
            events: None,
            expected: 0,
            loaded: 0,
        }
    }
}

impl Default for Preload {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState for Preload {
    fn name(&self) -> &'static str {
        "Preload"
    }

    fn enter(&mut self, services: &mut PipelineServices) {
        let (tx, rx) = mpsc::channel();
        self.expected = services.loader.begin_preload(tx);
        self.events = Some(rx);
        info!(expected = self.expected, "preloading startup content");
    }

    fn poll(&mut self, services: &mut PipelineServices, _dt: Duration) -> Transition {
        let drained: Vec<PreloadEvent> = match &self.events {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        };
        for event in drained {
            match event {
                PreloadEvent::ItemLoaded { name } => {
                    debug!(name, "preload item ready");
                    self.loaded += 1;
                }
                PreloadEvent::ItemFailed { name, message } => {
                    services.record_stall(PipelineError::PreloadFailed {
                        name,
                        reason: message,
                    });
                }
            }
        }

        if self.loaded >= self.expected && !services.is_session_fatal() {
            let scene_id = services.config.first_scene_id;
            Transition::To(Box::new(ChangeScene::new(SceneRequest { scene_id })))
        } else {
            Transition::Stay
        }
    }
}

/// Terminal state: hand the requested scene to the host application.
pub struct ChangeScene {
    request: SceneRequest,
}

impl ChangeScene {
    pub fn new(request: SceneRequest) -> Self {
        Self { request }
    }
}

impl PipelineState for ChangeScene {
    fn name(&self) -> &'static str {
        "ChangeScene"
    }

    fn enter(&mut self, _services: &mut PipelineServices) {
        info!(scene_id = self.request.scene_id, "bootstrap complete, handing off");
    }

    fn poll(&mut self, _services: &mut PipelineServices, _dt: Duration) -> Transition {
        Transition::Handoff(self.request)
    }
}
