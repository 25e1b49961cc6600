//! Version check and resource manifest update states.

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::PipelineError;
use crate::pipeline::machine::PipelineServices;
use crate::pipeline::state::{AbortReason, PipelineState, Transition};
use crate::services::{ConfirmRequest, Decision, FetchEvent};
use crate::version::{check_version, verify_payload, VersionCheck, VersionManifest, VersionUpdatePayload};

use super::VerifyResources;

enum CheckOutcome {
    UpToDate,
    UpdateNeeded(VersionUpdatePayload),
    Forced,
}

/// Fetch the server's version manifest and decide how to proceed.
///
/// Three exits: forced update aborts through the decision prompt, an
/// outdated local version advances to [`UpdateVersion`], and an up-to-date
/// client goes straight to verification. In the latter two cases the
/// resolved download root is published before leaving.
pub struct CheckVersion {
    url: String,
    events: Option<Receiver<FetchEvent>>,
    outcome: Option<CheckOutcome>,
    prompt_reply: Option<Receiver<Decision>>,
}

impl CheckVersion {
    pub fn new() -> Self {
        Self {
            url: String::new(),
            events: None,
            outcome: None,
            prompt_reply: None,
        }
    }

    fn handle_response(&mut self, services: &mut PipelineServices, bytes: &[u8]) {
        // Duplicate delivery after the decision was made is ignored.
        if self.outcome.is_some() {
            return;
        }

        let manifest = match VersionManifest::parse(bytes) {
            Ok(manifest) => manifest,
            Err(e) => {
                services.record_stall(e);
                return;
            }
        };

        match check_version(&manifest, services.store.local_version()) {
            VersionCheck::ForceUpdate => {
                warn!(
                    latest = %manifest.latest_version_label,
                    "server requires a newer client"
                );
                let (tx, rx) = mpsc::channel();
                services.prompt.confirm(
                    ConfirmRequest {
                        title: "Update required".to_string(),
                        message: format!(
                            "Version {} is required to continue. Update now?",
                            manifest.latest_version_label
                        ),
                        confirm_label: "Update".to_string(),
                        cancel_label: "Quit".to_string(),
                    },
                    tx,
                );
                self.prompt_reply = Some(rx);
                self.outcome = Some(CheckOutcome::Forced);
            }
            decision => {
                // Publish the download root for all subsequent fetches.
                services.download_root = Some(manifest.download_root_uri.clone());
                services.store.set_download_root(&manifest.download_root_uri);
                self.outcome = Some(match decision {
                    VersionCheck::UpToDate => CheckOutcome::UpToDate,
                    VersionCheck::UpdateNeeded(payload) => CheckOutcome::UpdateNeeded(payload),
                    VersionCheck::ForceUpdate => unreachable!("handled above"),
                });
            }
        }
    }
}

impl Default for CheckVersion {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState for CheckVersion {
    fn name(&self) -> &'static str {
        "CheckVersion"
    }

    fn enter(&mut self, services: &mut PipelineServices) {
        self.url = services
            .build_info
            .check_version_url_for(services.config.platform);
        info!(url = %self.url, "requesting version manifest");

        let (tx, rx) = mpsc::channel();
        services.transport.fetch(&self.url, tx);
        self.events = Some(rx);
    }

    fn poll(&mut self, services: &mut PipelineServices, _dt: Duration) -> Transition {
        let drained: Vec<FetchEvent> = match &self.events {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        };
        for event in drained {
            match event {
                FetchEvent::Completed(bytes) => self.handle_response(services, &bytes),
                FetchEvent::Failed(reason) => services.record_stall(PipelineError::Network {
                    url: self.url.clone(),
                    reason,
                }),
            }
        }

        match &self.outcome {
            None => Transition::Stay,
            Some(CheckOutcome::Forced) => {
                let reply = self
                    .prompt_reply
                    .as_ref()
                    .and_then(|rx| rx.try_recv().ok());
                match reply {
                    Some(Decision::Confirmed) => Transition::Abort(AbortReason::UpdateRedirect {
                        url: services.build_info.update_url.clone(),
                    }),
                    Some(Decision::Cancelled) => Transition::Abort(AbortReason::UserQuit),
                    None => Transition::Stay,
                }
            }
            Some(CheckOutcome::UpToDate) => Transition::To(Box::new(VerifyResources::new())),
            Some(CheckOutcome::UpdateNeeded(payload)) => {
                Transition::To(Box::new(UpdateVersion::new(*payload)))
            }
        }
    }
}

/// Download, verify, and install the new resource manifest.
///
/// Constructed with the expected length/hash pairs from the version check;
/// the downloaded bytes must match both the compressed and the inflated
/// pair before the store installs them.
pub struct UpdateVersion {
    payload: VersionUpdatePayload,
    url: String,
    events: Option<Receiver<FetchEvent>>,
    complete: bool,
}

impl UpdateVersion {
    pub fn new(payload: VersionUpdatePayload) -> Self {
        Self {
            payload,
            url: String::new(),
            events: None,
            complete: false,
        }
    }

    fn handle_response(&mut self, services: &mut PipelineServices, bytes: &[u8]) {
        if self.complete {
            return;
        }
        match verify_payload(bytes, &self.payload) {
            Ok(plain) => match services.store.install_version_manifest(&plain) {
                Ok(()) => {
                    info!(url = %self.url, "resource manifest installed");
                    self.complete = true;
                }
                Err(e) => services.record_stall(e.into()),
            },
            Err(e) => services.record_stall(e),
        }
    }
}

impl PipelineState for UpdateVersion {
    fn name(&self) -> &'static str {
        "UpdateVersion"
    }

    fn enter(&mut self, services: &mut PipelineServices) {
        let Some(root) = services.download_root.clone() else {
            services.record_stall(PipelineError::Network {
                url: services.config.resource_manifest_name.clone(),
                reason: "download root not resolved".to_string(),
            });
            return;
        };

        self.url = format!(
            "{}/{}",
            root.trim_end_matches('/'),
            services.config.resource_manifest_name
        );
        info!(url = %self.url, "downloading resource manifest");

        let (tx, rx) = mpsc::channel();
        services.transport.fetch(&self.url, tx);
        self.events = Some(rx);
    }

    fn poll(&mut self, services: &mut PipelineServices, _dt: Duration) -> Transition {
        let drained: Vec<FetchEvent> = match &self.events {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        };
        for event in drained {
            match event {
                FetchEvent::Completed(bytes) => self.handle_response(services, &bytes),
                FetchEvent::Failed(reason) => services.record_stall(PipelineError::Network {
                    url: self.url.clone(),
                    reason,
                }),
            }
        }

        if self.complete {
            Transition::To(Box::new(VerifyResources::new()))
        } else {
            Transition::Stay
        }
    }
}
