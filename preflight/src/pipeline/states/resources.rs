//! Resource store initialization, verification, and diffing states.

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use tracing::info;

use crate::diff::{diff_resources, DiffOutcome};
use crate::pipeline::machine::PipelineServices;
use crate::pipeline::state::{AbortReason, PipelineState, Transition};
use crate::services::{ConfirmRequest, Decision, InitEvent, VerifyEvent};
use crate::transfer::format_bytes;

use super::{Preload, ResourceUpdatePayload, UpdateResources};

/// Package mode: load the shipped resource index as-is, no network.
pub struct InitResources {
    events: Option<Receiver<InitEvent>>,
    complete: bool,
}

impl InitResources {
    pub fn new() -> Self {
        Self {
            events: None,
            complete: false,
        }
    }
}

impl Default for InitResources {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState for InitResources {
    fn name(&self) -> &'static str {
        "InitResources"
    }

    fn enter(&mut self, services: &mut PipelineServices) {
        let (tx, rx) = mpsc::channel();
        services.store.begin_init(tx);
        self.events = Some(rx);
    }

    fn poll(&mut self, _services: &mut PipelineServices, _dt: Duration) -> Transition {
        if let Some(rx) = &self.events {
            if rx.try_iter().any(|e| matches!(e, InitEvent::Completed)) {
                self.complete = true;
            }
        }

        if self.complete {
            Transition::To(Box::new(Preload::new()))
        } else {
            Transition::Stay
        }
    }
}

/// Rehash installed resources against the local index before diffing.
pub struct VerifyResources {
    events: Option<Receiver<VerifyEvent>>,
    complete: bool,
}

impl VerifyResources {
    pub fn new() -> Self {
        Self {
            events: None,
            complete: false,
        }
    }
}

impl Default for VerifyResources {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState for VerifyResources {
    fn name(&self) -> &'static str {
        "VerifyResources"
    }

    fn enter(&mut self, services: &mut PipelineServices) {
        let (tx, rx) = mpsc::channel();
        services.store.begin_verify(tx);
        self.events = Some(rx);
    }

    fn poll(&mut self, _services: &mut PipelineServices, _dt: Duration) -> Transition {
        if let Some(rx) = &self.events {
            for event in rx.try_iter() {
                let VerifyEvent::Completed { checked, invalid } = event;
                info!(checked, invalid, "local resource verification complete");
                self.complete = true;
            }
        }

        if self.complete {
            Transition::To(Box::new(CheckResources::new()))
        } else {
            Transition::Stay
        }
    }
}

/// Diff local resources against the remote manifest and route accordingly.
///
/// The diff itself is synchronous and runs in `enter`. When downloads are
/// needed on a metered network, the user is asked once before the update
/// state is entered.
pub struct CheckResources {
    outcome: Option<DiffOutcome>,
    prompt_reply: Option<Receiver<Decision>>,
}

impl CheckResources {
    pub fn new() -> Self {
        Self {
            outcome: None,
            prompt_reply: None,
        }
    }

    fn payload(&self) -> ResourceUpdatePayload {
        let outcome = self.outcome.as_ref().expect("diff ran in enter");
        ResourceUpdatePayload {
            entries: outcome.to_fetch.clone(),
            totals: outcome.totals,
        }
    }
}

impl Default for CheckResources {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState for CheckResources {
    fn name(&self) -> &'static str {
        "CheckResources"
    }

    fn enter(&mut self, services: &mut PipelineServices) {
        let remote = match services.store.load_remote_manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                services.record_stall(e.into());
                return;
            }
        };

        let local = services.store.list_local();
        let outcome = diff_resources(&local, &remote, services.store.as_ref());

        if outcome.needs_update() && services.config.metered_network {
            let (tx, rx) = mpsc::channel();
            services.prompt.confirm(
                ConfirmRequest {
                    title: "Metered network".to_string(),
                    message: format!(
                        "{} of updates will be downloaded over a metered connection. Continue?",
                        format_bytes(outcome.totals.total_compressed_bytes)
                    ),
                    confirm_label: "Download".to_string(),
                    cancel_label: "Quit".to_string(),
                },
                tx,
            );
            self.prompt_reply = Some(rx);
        }

        self.outcome = Some(outcome);
    }

    fn poll(&mut self, _services: &mut PipelineServices, _dt: Duration) -> Transition {
        let Some(outcome) = &self.outcome else {
            return Transition::Stay;
        };

        if !outcome.needs_update() {
            return Transition::To(Box::new(Preload::new()));
        }

        if let Some(rx) = &self.prompt_reply {
            return match rx.try_recv().ok() {
                Some(Decision::Confirmed) => {
                    Transition::To(Box::new(UpdateResources::new(self.payload())))
                }
                Some(Decision::Cancelled) => Transition::Abort(AbortReason::UserQuit),
                None => Transition::Stay,
            };
        }

        Transition::To(Box::new(UpdateResources::new(self.payload())))
    }
}
