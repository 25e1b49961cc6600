//! State lifecycle contract and transition types.

use std::time::Duration;

use super::machine::PipelineServices;

/// Scene the application should load after the pipeline hands off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneRequest {
    pub scene_id: u32,
}

/// Why the pipeline aborted before handing off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The user accepted a forced update; redirect to this URL and exit.
    UpdateRedirect { url: String },
    /// The user declined to continue; terminate.
    UserQuit,
}

/// Result of polling a state.
pub enum Transition {
    /// Completion latch not set yet; poll again next tick.
    Stay,
    /// Advance to the given state (constructed with its typed payload).
    To(Box<dyn PipelineState>),
    /// Abort the pipeline; no further states run.
    Abort(AbortReason),
    /// Exit point: hand off to steady-state application logic.
    Handoff(SceneRequest),
}

/// One state of the bootstrap pipeline.
///
/// `enter` performs one-shot setup and issues the asynchronous operation
/// whose completion gates the transition. `poll` runs every scheduler tick,
/// drains the state's channels, and must be idempotent: it never re-issues
/// work. `leave` runs exactly once, even when the pipeline aborts; states
/// release their subscriptions by dropping the channel receivers they own,
/// so a late collaborator callback hits a closed channel instead of a
/// departed state.
pub trait PipelineState {
    fn name(&self) -> &'static str;

    fn enter(&mut self, services: &mut PipelineServices);

    fn poll(&mut self, services: &mut PipelineServices, dt: Duration) -> Transition;

    fn leave(&mut self, services: &mut PipelineServices, aborting: bool) {
        let _ = (services, aborting);
    }
}
