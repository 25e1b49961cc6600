//! Concurrent resource download state.

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::diff::ResourceUpdateEntry;
use crate::error::PipelineError;
use crate::pipeline::machine::PipelineServices;
use crate::pipeline::state::{PipelineState, Transition};
use crate::services::TransferEvent;
use crate::transfer::{RetryDecision, SessionTotals, TransferTracker};

use super::Preload;

/// Everything the download state needs, produced by the resource diff.
#[derive(Debug, Clone)]
pub struct ResourceUpdatePayload {
    /// Resources to fetch, ordered by name.
    pub entries: Vec<ResourceUpdateEntry>,
    /// Totals for progress computation.
    pub totals: SessionTotals,
}

/// Download the needs-fetch set, tracking per-resource progress.
///
/// The transport owns per-resource retries and reports each failure with
/// its retry counters; this state only decides when a resource is
/// abandoned, which makes the whole session fatal. A fatal session never
/// advances, it waits for the host to observe the error and shut down.
pub struct UpdateResources {
    payload: ResourceUpdatePayload,
    tracker: TransferTracker,
    events: Option<Receiver<TransferEvent>>,
    complete: bool,
}

impl UpdateResources {
    pub fn new(payload: ResourceUpdatePayload) -> Self {
        let tracker = TransferTracker::new(payload.totals);
        Self {
            payload,
            tracker,
            events: None,
            complete: false,
        }
    }

    fn handle_event(&mut self, services: &mut PipelineServices, event: TransferEvent) {
        match event {
            TransferEvent::Started { name } => self.tracker.start(&name),
            TransferEvent::Progress { name, bytes } => self.tracker.progress(&name, bytes),
            TransferEvent::Succeeded {
                name,
                compressed_length,
            } => {
                debug!(name, compressed_length, "resource downloaded");
                self.tracker.success(&name, compressed_length);
            }
            TransferEvent::Failed {
                name,
                retry_count,
                total_retry_count,
                message,
            } => {
                self.tracker.remove(&name);
                match services
                    .retry_policy
                    .assess(&name, retry_count, total_retry_count)
                {
                    RetryDecision::Retry => {
                        // The transport restarts the download on its own.
                    }
                    RetryDecision::Abandon => {
                        error!(name, message, "resource abandoned after retries");
                        services.mark_session_fatal(PipelineError::RetriesExhausted {
                            name,
                            attempts: retry_count,
                        });
                    }
                }
            }
            TransferEvent::GroupComplete { succeeded } => {
                if succeeded && !services.is_session_fatal() {
                    self.complete = true;
                }
            }
        }
    }
}

impl PipelineState for UpdateResources {
    fn name(&self) -> &'static str {
        "UpdateResources"
    }

    fn enter(&mut self, services: &mut PipelineServices) {
        info!(
            resources = self.payload.totals.resource_count,
            compressed_bytes = self.payload.totals.total_compressed_bytes,
            "starting resource update"
        );

        let Some(root) = services.download_root.clone() else {
            services.record_stall(PipelineError::Network {
                url: String::new(),
                reason: "download root not resolved".to_string(),
            });
            return;
        };

        let (tx, rx) = mpsc::channel();
        services
            .transport
            .download_group(&root, &self.payload.entries, tx);
        self.events = Some(rx);
    }

    fn poll(&mut self, services: &mut PipelineServices, _dt: Duration) -> Transition {
        let drained: Vec<TransferEvent> = match &self.events {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        };
        for event in drained {
            self.handle_event(services, event);
        }

        services.progress.report(
            self.tracker.ratio(),
            &self
                .tracker
                .progress_text(services.transport.current_speed()),
        );

        if self.complete {
            Transition::To(Box::new(Preload::new()))
        } else {
            Transition::Stay
        }
    }
}
