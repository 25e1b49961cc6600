//! Pipeline machine: tick driver and shared collaborator handles.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::state::{AbortReason, PipelineState, SceneRequest, Transition};
use super::states::Launch;
use crate::config::{BootstrapConfig, BuildInfo};
use crate::error::PipelineError;
use crate::services::{ContentLoader, DecisionPrompt, ProgressSink, ResourceStore, Transport};
use crate::transfer::RetryPolicy;

/// Collaborator handles and session-wide flags shared by every state.
///
/// Owned by the machine for the lifetime of one pipeline run and passed by
/// mutable reference into every state callback; transitions are strictly
/// sequential so no state ever observes another state's writes mid-flight.
pub struct PipelineServices {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn ResourceStore>,
    pub loader: Arc<dyn ContentLoader>,
    pub progress: Arc<dyn ProgressSink>,
    pub prompt: Arc<dyn DecisionPrompt>,
    pub build_info: BuildInfo,
    pub config: BootstrapConfig,
    pub retry_policy: RetryPolicy,

    /// Download root resolved by the version check, consumed by the
    /// manifest and resource download states.
    pub download_root: Option<String>,

    session_fatal: bool,
    stall: Option<PipelineError>,
}

impl PipelineServices {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn ResourceStore>,
        loader: Arc<dyn ContentLoader>,
        progress: Arc<dyn ProgressSink>,
        prompt: Arc<dyn DecisionPrompt>,
        build_info: BuildInfo,
        config: BootstrapConfig,
    ) -> Self {
        let retry_policy = RetryPolicy::new(config.max_retry_attempts);
        Self {
            transport,
            store,
            loader,
            progress,
            prompt,
            build_info,
            config,
            retry_policy,
            download_root: None,
            session_fatal: false,
            stall: None,
        }
    }

    /// Record an error that leaves the pipeline stalled in its current
    /// state. The state's completion latch stays unset; the operator sees
    /// the error through [`PipelineMachine::status`].
    pub fn record_stall(&mut self, err: PipelineError) {
        error!(error = %err, "pipeline stalled");
        self.stall = Some(err);
    }

    /// Mark the whole update session as failed. The owning state never
    /// completes after this.
    pub fn mark_session_fatal(&mut self, err: PipelineError) {
        self.session_fatal = true;
        self.record_stall(err);
    }

    pub fn is_session_fatal(&self) -> bool {
        self.session_fatal
    }

    pub fn stall_error(&self) -> Option<&PipelineError> {
        self.stall.as_ref()
    }
}

/// Terminal result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Bootstrap finished; the application takes over with this scene.
    Handoff(SceneRequest),
    /// The pipeline aborted before completion.
    Aborted(AbortReason),
}

/// Point-in-time view of the machine, for stall detection and display.
#[derive(Debug, Clone)]
pub struct MachineStatus {
    /// Name of the current state, or `None` once the run finished.
    pub state: Option<&'static str>,
    /// Ticks spent in the current state; resets on every transition.
    pub ticks_in_state: u64,
    pub session_fatal: bool,
    /// Last error that left the pipeline stalled, if any.
    pub stall: Option<String>,
}

/// Drives the bootstrap states with a cooperative tick.
///
/// The machine owns the shared services and the current state. Each tick
/// polls once and performs at most one transition; `leave` is guaranteed
/// to run exactly once per entered state, including on abort and on
/// [`shutdown`](Self::shutdown). The machine has no watchdog of its own:
/// a collaborator that never calls back leaves the pipeline in place, and
/// the embedding application detects that via `status()` showing no
/// progress across ticks.
pub struct PipelineMachine {
    services: PipelineServices,
    current: Option<Box<dyn PipelineState>>,
    ticks_in_state: u64,
    outcome: Option<PipelineOutcome>,
}

impl PipelineMachine {
    /// Create the machine and enter the initial `Launch` state.
    pub fn new(mut services: PipelineServices) -> Self {
        let mut state: Box<dyn PipelineState> = Box::new(Launch::new());
        info!(state = state.name(), "pipeline starting");
        state.enter(&mut services);
        Self {
            services,
            current: Some(state),
            ticks_in_state: 0,
            outcome: None,
        }
    }

    /// Advance the pipeline by one scheduler tick.
    ///
    /// Returns the terminal outcome once the pipeline has handed off or
    /// aborted; further ticks are no-ops after that.
    pub fn tick(&mut self, dt: Duration) -> Option<&PipelineOutcome> {
        if self.outcome.is_some() {
            return self.outcome.as_ref();
        }
        let transition = match self.current.as_mut() {
            Some(state) => {
                self.ticks_in_state += 1;
                state.poll(&mut self.services, dt)
            }
            None => return None,
        };

        match transition {
            Transition::Stay => None,
            Transition::To(mut next) => {
                let mut old = self.current.take().expect("polled state present");
                old.leave(&mut self.services, false);
                info!(from = old.name(), to = next.name(), "pipeline transition");
                next.enter(&mut self.services);
                self.current = Some(next);
                self.ticks_in_state = 0;
                None
            }
            Transition::Abort(reason) => {
                let mut old = self.current.take().expect("polled state present");
                old.leave(&mut self.services, true);
                warn!(from = old.name(), ?reason, "pipeline aborted");
                self.outcome = Some(PipelineOutcome::Aborted(reason));
                self.outcome.as_ref()
            }
            Transition::Handoff(request) => {
                let mut old = self.current.take().expect("polled state present");
                old.leave(&mut self.services, false);
                info!(scene_id = request.scene_id, "pipeline handing off");
                self.outcome = Some(PipelineOutcome::Handoff(request));
                self.outcome.as_ref()
            }
        }
    }

    /// Tear the pipeline down before completion (user quit, fatal abort).
    ///
    /// Runs the current state's `leave` so all pending subscriptions are
    /// released before the services are dropped.
    pub fn shutdown(&mut self) {
        if let Some(mut state) = self.current.take() {
            warn!(state = state.name(), "pipeline shut down");
            state.leave(&mut self.services, true);
        }
    }

    pub fn status(&self) -> MachineStatus {
        MachineStatus {
            state: self.current.as_deref().map(|s| s.name()),
            ticks_in_state: self.ticks_in_state,
            session_fatal: self.services.is_session_fatal(),
            stall: self.services.stall_error().map(ToString::to_string),
        }
    }

    /// Name of the current state, if the run is still in progress.
    pub fn state_name(&self) -> Option<&'static str> {
        self.current.as_deref().map(|s| s.name())
    }

    pub fn outcome(&self) -> Option<&PipelineOutcome> {
        self.outcome.as_ref()
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaunchMode;
    use crate::pipeline::testkit::*;

    fn run_to_outcome(machine: &mut PipelineMachine, max_ticks: usize) -> Vec<&'static str> {
        let mut visited = Vec::new();
        for _ in 0..max_ticks {
            if let Some(name) = machine.state_name() {
                if visited.last() != Some(&name) {
                    visited.push(name);
                }
            }
            if machine.tick(Duration::from_millis(16)).is_some() {
                break;
            }
        }
        visited
    }

    #[test]
    fn test_passthrough_mode_skips_update_states() {
        let fixture = Fixture::new(LaunchMode::Passthrough);
        let mut machine = PipelineMachine::new(fixture.services());

        let visited = run_to_outcome(&mut machine, 50);

        assert_eq!(visited, vec!["Launch", "Splash", "Preload", "ChangeScene"]);
        assert!(matches!(
            machine.outcome(),
            Some(PipelineOutcome::Handoff(SceneRequest { scene_id: 1 }))
        ));
    }

    #[test]
    fn test_package_mode_initializes_then_preloads() {
        let fixture = Fixture::new(LaunchMode::Package);
        let mut machine = PipelineMachine::new(fixture.services());

        let visited = run_to_outcome(&mut machine, 50);

        assert_eq!(
            visited,
            vec!["Launch", "Splash", "InitResources", "Preload", "ChangeScene"]
        );
    }

    #[test]
    fn test_up_to_date_skips_update_version() {
        // Local version equals the remote internal version.
        let fixture = Fixture::new(LaunchMode::Updatable)
            .with_local_version(7)
            .with_version_manifest(7, false)
            .with_installed_manifest_matching_local();
        let mut machine = PipelineMachine::new(fixture.services());

        let visited = run_to_outcome(&mut machine, 50);

        assert!(!visited.contains(&"UpdateVersion"));
        assert!(visited.contains(&"VerifyResources"));
        assert!(matches!(
            machine.outcome(),
            Some(PipelineOutcome::Handoff(_))
        ));
    }

    #[test]
    fn test_outdated_local_enters_update_version() {
        // Local version 5, remote 7: UpdateVersion runs before verify.
        let fixture = Fixture::new(LaunchMode::Updatable)
            .with_local_version(5)
            .with_version_manifest(7, false)
            .with_installed_manifest_matching_local();
        let mut machine = PipelineMachine::new(fixture.services());

        let visited = run_to_outcome(&mut machine, 50);

        let update_pos = visited.iter().position(|s| *s == "UpdateVersion");
        let verify_pos = visited.iter().position(|s| *s == "VerifyResources");
        assert!(update_pos.is_some());
        assert!(verify_pos.is_some());
        assert!(update_pos < verify_pos);
    }

    #[test]
    fn test_force_update_prompts_once_and_never_downloads() {
        let fixture = Fixture::new(LaunchMode::Updatable)
            .with_version_manifest(9, true)
            .with_prompt_decision(crate::services::Decision::Confirmed);
        let mut machine = PipelineMachine::new(fixture.services());

        let visited = run_to_outcome(&mut machine, 50);

        assert_eq!(fixture.prompt_calls(), 1);
        assert_eq!(fixture.group_download_calls(), 0);
        assert!(!visited.contains(&"UpdateResources"));
        match machine.outcome() {
            Some(PipelineOutcome::Aborted(AbortReason::UpdateRedirect { url })) => {
                assert_eq!(url, "https://example.com/get-latest");
            }
            other => panic!("expected update redirect, got {:?}", other),
        }
    }

    #[test]
    fn test_force_update_cancel_quits() {
        let fixture = Fixture::new(LaunchMode::Updatable)
            .with_version_manifest(9, true)
            .with_prompt_decision(crate::services::Decision::Cancelled);
        let mut machine = PipelineMachine::new(fixture.services());

        run_to_outcome(&mut machine, 50);

        assert!(matches!(
            machine.outcome(),
            Some(PipelineOutcome::Aborted(AbortReason::UserQuit))
        ));
    }

    #[test]
    fn test_full_update_flow_reaches_handoff() {
        let fixture = Fixture::new(LaunchMode::Updatable)
            .with_local_version(5)
            .with_version_manifest(7, false)
            .with_remote_resources(&[("bundle_a", 100), ("bundle_b", 200)])
            .with_successful_group_download();
        let mut machine = PipelineMachine::new(fixture.services());

        let visited = run_to_outcome(&mut machine, 100);

        assert!(visited.contains(&"UpdateResources"));
        assert!(matches!(
            machine.outcome(),
            Some(PipelineOutcome::Handoff(_))
        ));
        assert_eq!(fixture.group_download_calls(), 1);

        // Progress was republished and ended complete.
        let reports = fixture.progress_reports();
        assert!(!reports.is_empty());
        let final_ratio = reports.last().unwrap().0;
        assert!((final_ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_network_failure_stalls_check_version() {
        let fixture = Fixture::new(LaunchMode::Updatable).with_fetch_failure("connection refused");
        let mut machine = PipelineMachine::new(fixture.services());

        for _ in 0..20 {
            machine.tick(Duration::from_millis(16));
        }

        let status = machine.status();
        assert_eq!(status.state, Some("CheckVersion"));
        assert!(status.stall.unwrap().contains("connection refused"));
        assert!(machine.outcome().is_none());
    }

    #[test]
    fn test_retry_exhaustion_marks_session_fatal_and_stalls() {
        // Resource fails with retry_count == total_retry_count == 3.
        let fixture = Fixture::new(LaunchMode::Updatable)
            .with_local_version(5)
            .with_version_manifest(7, false)
            .with_remote_resources(&[("bundle_c", 100)])
            .with_exhausted_group_download("bundle_c", 3);
        let mut machine = PipelineMachine::new(fixture.services());

        for _ in 0..100 {
            machine.tick(Duration::from_millis(16));
        }

        let status = machine.status();
        assert!(status.session_fatal);
        assert_eq!(status.state, Some("UpdateResources"));
        assert!(machine.outcome().is_none());
    }

    #[test]
    fn test_shutdown_releases_current_state() {
        let fixture = Fixture::new(LaunchMode::Updatable).with_fetch_failure("unreachable");
        let mut machine = PipelineMachine::new(fixture.services());

        machine.tick(Duration::from_millis(16));
        machine.shutdown();

        assert_eq!(machine.state_name(), None);
        // Ticking after shutdown is a no-op.
        assert!(machine.tick(Duration::from_millis(16)).is_none());
    }
}
