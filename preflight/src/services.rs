//! Collaborator capability interfaces consumed by the pipeline core.
//!
//! The core never talks to the network, the disk, or the user directly.
//! Each external concern is a trait here, and every asynchronous operation
//! completes by sending events into an `std::sync::mpsc` channel whose
//! receiver is owned by the requesting pipeline state. Draining on the tick
//! thread is the only place collaborator results touch shared state, so no
//! locking is needed inside the core. When a state leaves, it drops its
//! receiver; collaborators must tolerate the resulting send failures (late
//! delivery to a departed state is ignored by construction).

use std::collections::HashMap;
use std::sync::mpsc::Sender;

use thiserror::Error;

use crate::diff::{LocalResource, ResourceManifest, ResourceUpdateEntry};

/// Errors from a resource store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("failed to write {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("failed to remove {name}: {reason}")]
    RemovalFailed { name: String, reason: String },

    #[error("installed resource manifest is invalid: {reason}")]
    InvalidManifest { reason: String },

    #[error("no resource manifest installed")]
    NoManifest,
}

/// Outcome of a single-file fetch.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    /// The full response body.
    Completed(Vec<u8>),
    /// The request failed after the transport's own retries.
    Failed(String),
}

/// Progress events for a group download session.
///
/// Event names and payloads mirror the transport boundary: one `Started`
/// per resource attempt (a repeat for the same name means the transport
/// restarted it), byte-level `Progress`, terminal `Succeeded` or `Failed`
/// per attempt, and a single `GroupComplete` once the transport gives up
/// or finishes everything.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Started {
        name: String,
    },
    Progress {
        name: String,
        bytes: u64,
    },
    Succeeded {
        name: String,
        compressed_length: u64,
    },
    Failed {
        name: String,
        retry_count: u32,
        total_retry_count: u32,
        message: String,
    },
    GroupComplete {
        succeeded: bool,
    },
}

/// Completion of a local resource verification scan.
#[derive(Debug, Clone, Copy)]
pub enum VerifyEvent {
    Completed { checked: usize, invalid: usize },
}

/// Completion of package-mode resource initialization.
#[derive(Debug, Clone, Copy)]
pub enum InitEvent {
    Completed,
}

/// Per-item outcome of content preloading.
#[derive(Debug, Clone)]
pub enum PreloadEvent {
    ItemLoaded { name: String },
    ItemFailed { name: String, message: String },
}

/// User decision delivered by the prompt collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirmed,
    Cancelled,
}

/// A blocking confirm/cancel question for the user.
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub title: String,
    pub message: String,
    pub confirm_label: String,
    pub cancel_label: String,
}

/// Network transport collaborator.
///
/// The transport owns its threads, timeouts, and backoff scheduling. For
/// group downloads it re-attempts failing resources autonomously; the core
/// only decides continue-vs-abandon from the `Failed` events it receives.
pub trait Transport: Send + Sync {
    /// Fetch a single URL, delivering the outcome as one `FetchEvent`.
    fn fetch(&self, url: &str, events: Sender<FetchEvent>);

    /// Download a set of resources under the given root URL, streaming
    /// `TransferEvent`s as transfers start, progress, and finish.
    fn download_group(
        &self,
        root_url: &str,
        entries: &[ResourceUpdateEntry],
        events: Sender<TransferEvent>,
    );

    /// Current aggregate download speed in bytes per second, sampled by
    /// the transport. Passed through to the progress display unmodified.
    fn current_speed(&self) -> u64 {
        0
    }
}

/// Local resource store collaborator.
///
/// Owns the installed resource index, the persisted local version, and the
/// on-disk bundles. The pipeline core holds no persistent state of its own.
pub trait ResourceStore: Send + Sync {
    /// Internal numeric version of the installed resource set.
    fn local_version(&self) -> u32;

    /// Snapshot of the local resource index.
    fn list_local(&self) -> HashMap<String, LocalResource>;

    /// Delete a resource that no longer exists remotely.
    fn apply_removal(&self, name: &str) -> Result<(), StoreError>;

    /// Record the download root all subsequent resource fetches use.
    fn set_download_root(&self, url: &str);

    /// Install a freshly verified resource manifest (uncompressed bytes).
    fn install_version_manifest(&self, bytes: &[u8]) -> Result<(), StoreError>;

    /// Parse and return the currently installed resource manifest.
    fn load_remote_manifest(&self) -> Result<ResourceManifest, StoreError>;

    /// Persist a downloaded resource (uncompressed bytes) into the store.
    ///
    /// Called by the transport after verification, not by the core.
    fn commit_resource(&self, name: &str, data: &[u8], hash: u32) -> Result<(), StoreError>;

    /// Start an asynchronous integrity scan of the installed resources.
    fn begin_verify(&self, events: Sender<VerifyEvent>);

    /// Start asynchronous package-mode resource initialization.
    fn begin_init(&self, events: Sender<InitEvent>);
}

/// Content preloading collaborator.
pub trait ContentLoader: Send + Sync {
    /// Begin preloading; returns the number of items that will report.
    fn begin_preload(&self, events: Sender<PreloadEvent>) -> usize;
}

/// Progress display collaborator.
pub trait ProgressSink: Send + Sync {
    /// Publish the aggregate progress ratio (clamped to `[0, 1]`) and a
    /// human-readable summary line.
    fn report(&self, ratio: f64, human_text: &str);
}

/// User decision collaborator for forced-update and metered-network
/// confirmations. Must not block the caller; the reply arrives on the
/// channel whenever the user decides.
pub trait DecisionPrompt: Send + Sync {
    fn confirm(&self, request: ConfirmRequest, reply: Sender<Decision>);
}
