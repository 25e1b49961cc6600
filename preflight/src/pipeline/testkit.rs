//! Scripted collaborator doubles and the shared test fixture.
//!
//! Every mock delivers its events synchronously into the requesting
//! state's channel, so a single poll after `enter` observes the whole
//! scripted exchange. Sends ignore closed channels the same way real
//! collaborators must.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::{BootstrapConfig, BuildInfo, LaunchMode};
use crate::diff::{LocalResource, RemoteResource, ResourceManifest, ResourceUpdateEntry};
use crate::services::{
    ConfirmRequest, ContentLoader, Decision, DecisionPrompt, FetchEvent, InitEvent, PreloadEvent,
    ProgressSink, ResourceStore, StoreError, Transport, TransferEvent, VerifyEvent,
};
use crate::version::crc32;

use super::machine::PipelineServices;

enum GroupScript {
    /// Every resource downloads on the first attempt.
    Success,
    /// One resource fails with its retry budget spent; the rest succeed.
    Exhausted { name: String, attempts: u32 },
    /// One resource reports a failure the transport will retry; the group
    /// stays open.
    FailOnce {
        name: String,
        retry_count: u32,
        total_retry_count: u32,
    },
}

pub struct ScriptedTransport {
    fetch_script: Mutex<Option<Result<Vec<u8>, String>>>,
    version_bytes: Mutex<Option<Vec<u8>>>,
    manifest_bytes: Mutex<Option<Vec<u8>>>,
    group_script: Mutex<GroupScript>,
    group_calls: AtomicUsize,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self {
            fetch_script: Mutex::new(None),
            version_bytes: Mutex::new(None),
            manifest_bytes: Mutex::new(None),
            group_script: Mutex::new(GroupScript::Success),
            group_calls: AtomicUsize::new(0),
        }
    }
}

impl Transport for ScriptedTransport {
    fn fetch(&self, url: &str, events: Sender<FetchEvent>) {
        if let Some(script) = self.fetch_script.lock().unwrap().clone() {
            let event = match script {
                Ok(bytes) => FetchEvent::Completed(bytes),
                Err(reason) => FetchEvent::Failed(reason),
            };
            let _ = events.send(event);
            return;
        }

        let bytes = if url.ends_with(".gz") {
            self.manifest_bytes.lock().unwrap().clone()
        } else {
            self.version_bytes.lock().unwrap().clone()
        };
        let event = match bytes {
            Some(bytes) => FetchEvent::Completed(bytes),
            None => FetchEvent::Failed("no scripted response".to_string()),
        };
        let _ = events.send(event);
    }

    fn download_group(
        &self,
        _root_url: &str,
        entries: &[ResourceUpdateEntry],
        events: Sender<TransferEvent>,
    ) {
        self.group_calls.fetch_add(1, Ordering::SeqCst);

        match &*self.group_script.lock().unwrap() {
            GroupScript::Success => {
                for entry in entries {
                    let _ = events.send(TransferEvent::Started {
                        name: entry.name.clone(),
                    });
                    let _ = events.send(TransferEvent::Progress {
                        name: entry.name.clone(),
                        bytes: entry.compressed_length,
                    });
                    let _ = events.send(TransferEvent::Succeeded {
                        name: entry.name.clone(),
                        compressed_length: entry.compressed_length,
                    });
                }
                let _ = events.send(TransferEvent::GroupComplete { succeeded: true });
            }
            GroupScript::Exhausted { name, attempts } => {
                for entry in entries {
                    let _ = events.send(TransferEvent::Started {
                        name: entry.name.clone(),
                    });
                    if entry.name == *name {
                        let _ = events.send(TransferEvent::Failed {
                            name: entry.name.clone(),
                            retry_count: *attempts,
                            total_retry_count: *attempts,
                            message: "simulated transfer failure".to_string(),
                        });
                    } else {
                        let _ = events.send(TransferEvent::Succeeded {
                            name: entry.name.clone(),
                            compressed_length: entry.compressed_length,
                        });
                    }
                }
                let _ = events.send(TransferEvent::GroupComplete { succeeded: false });
            }
            GroupScript::FailOnce {
                name,
                retry_count,
                total_retry_count,
            } => {
                let _ = events.send(TransferEvent::Started { name: name.clone() });
                let _ = events.send(TransferEvent::Failed {
                    name: name.clone(),
                    retry_count: *retry_count,
                    total_retry_count: *total_retry_count,
                    message: "simulated transfer failure".to_string(),
                });
            }
        }
    }

    fn current_speed(&self) -> u64 {
        1024
    }
}

#[derive(Default)]
pub struct MemoryStore {
    version: AtomicU32,
    local: Mutex<HashMap<String, LocalResource>>,
    installed: Mutex<Option<Vec<u8>>>,
    download_root: Mutex<Option<String>>,
    removals: Mutex<Vec<String>>,
}

impl ResourceStore for MemoryStore {
    fn local_version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    fn list_local(&self) -> HashMap<String, LocalResource> {
        self.local.lock().unwrap().clone()
    }

    fn apply_removal(&self, name: &str) -> Result<(), StoreError> {
        self.local.lock().unwrap().remove(name);
        self.removals.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn set_download_root(&self, url: &str) {
        *self.download_root.lock().unwrap() = Some(url.to_string());
    }

    fn install_version_manifest(&self, bytes: &[u8]) -> Result<(), StoreError> {
        *self.installed.lock().unwrap() = Some(bytes.to_vec());
        Ok(())
    }

    fn load_remote_manifest(&self) -> Result<ResourceManifest, StoreError> {
        match self.installed.lock().unwrap().as_deref() {
            Some(bytes) => ResourceManifest::parse(bytes).map_err(|e| {
                StoreError::InvalidManifest {
                    reason: e.to_string(),
                }
            }),
            None => Err(StoreError::NoManifest),
        }
    }

    fn commit_resource(&self, name: &str, data: &[u8], hash: u32) -> Result<(), StoreError> {
        self.local.lock().unwrap().insert(
            name.to_string(),
            LocalResource {
                length: data.len() as u64,
                hash,
            },
        );
        Ok(())
    }

    fn begin_verify(&self, events: Sender<VerifyEvent>) {
        let checked = self.local.lock().unwrap().len();
        let _ = events.send(VerifyEvent::Completed {
            checked,
            invalid: 0,
        });
    }

    fn begin_init(&self, events: Sender<InitEvent>) {
        let _ = events.send(InitEvent::Completed);
    }
}

#[derive(Default)]
pub struct StaticLoader {
    items: Mutex<Vec<String>>,
    failing: Mutex<Option<String>>,
    deferred: AtomicBool,
    pending: Mutex<Option<Sender<PreloadEvent>>>,
}

impl ContentLoader for StaticLoader {
    fn begin_preload(&self, events: Sender<PreloadEvent>) -> usize {
        let items = self.items.lock().unwrap().clone();
        if self.deferred.load(Ordering::SeqCst) {
            *self.pending.lock().unwrap() = Some(events);
            return items.len();
        }

        let failing = self.failing.lock().unwrap().clone();
        for name in &items {
            let event = if failing.as_deref() == Some(name.as_str()) {
                PreloadEvent::ItemFailed {
                    name: name.clone(),
                    message: "simulated load failure".to_string(),
                }
            } else {
                PreloadEvent::ItemLoaded { name: name.clone() }
            };
            let _ = events.send(event);
        }
        items.len()
    }
}

#[derive(Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<(f64, String)>>,
}

impl ProgressSink for CollectingSink {
    fn report(&self, ratio: f64, human_text: &str) {
        self.reports
            .lock()
            .unwrap()
            .push((ratio, human_text.to_string()));
    }
}

#[derive(Default)]
pub struct AutoPrompt {
    decision: Mutex<Option<Decision>>,
    calls: AtomicUsize,
}

impl DecisionPrompt for AutoPrompt {
    fn confirm(&self, _request: ConfirmRequest, reply: Sender<Decision>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(decision) = *self.decision.lock().unwrap() {
            let _ = reply.send(decision);
        }
    }
}

/// Builder for a fully scripted pipeline environment.
pub struct Fixture {
    mode: LaunchMode,
    first_scene: u32,
    metered: bool,
    manifest_version: u32,
    force_update: bool,
    remote: Vec<(String, u64)>,
    match_local: bool,
    no_manifest: bool,
    transport: Arc<ScriptedTransport>,
    store: Arc<MemoryStore>,
    loader: Arc<StaticLoader>,
    sink: Arc<CollectingSink>,
    prompt: Arc<AutoPrompt>,
}

impl Fixture {
    pub fn new(mode: LaunchMode) -> Self {
        Self {
            mode,
            first_scene: 1,
            metered: false,
            manifest_version: 0,
            force_update: false,
            remote: Vec::new(),
            match_local: false,
            no_manifest: false,
            transport: Arc::new(ScriptedTransport::default()),
            store: Arc::new(MemoryStore::default()),
            loader: Arc::new(StaticLoader::default()),
            sink: Arc::new(CollectingSink::default()),
            prompt: Arc::new(AutoPrompt::default()),
        }
    }

    pub fn with_local_version(self, version: u32) -> Self {
        self.store.version.store(version, Ordering::SeqCst);
        self
    }

    pub fn with_version_manifest(mut self, internal: u32, force: bool) -> Self {
        self.manifest_version = internal;
        self.force_update = force;
        self
    }

    /// Resources declared by the remote manifest, as (name, compressed
    /// length) pairs. The uncompressed length is twice the compressed one.
    pub fn with_remote_resources(mut self, entries: &[(&str, u64)]) -> Self {
        self.remote = entries
            .iter()
            .map(|(name, len)| (name.to_string(), *len))
            .collect();
        self
    }

    /// Make the local index match the remote manifest, so no downloads
    /// are needed.
    pub fn with_installed_manifest_matching_local(mut self) -> Self {
        self.match_local = true;
        self
    }

    pub fn with_no_remote_manifest(mut self) -> Self {
        self.no_manifest = true;
        self
    }

    pub fn with_metered_network(mut self) -> Self {
        self.metered = true;
        self
    }

    pub fn with_first_scene(mut self, scene_id: u32) -> Self {
        self.first_scene = scene_id;
        self
    }

    /// Script every single-file fetch to return these bytes.
    pub fn with_fetch_bytes(self, bytes: Vec<u8>) -> Self {
        *self.transport.fetch_script.lock().unwrap() = Some(Ok(bytes));
        self
    }

    /// Script every single-file fetch to fail with this reason.
    pub fn with_fetch_failure(self, reason: &str) -> Self {
        *self.transport.fetch_script.lock().unwrap() = Some(Err(reason.to_string()));
        self
    }

    pub fn with_successful_group_download(self) -> Self {
        *self.transport.group_script.lock().unwrap() = GroupScript::Success;
        self
    }

    /// Script the named resource to fail with its retry budget spent.
    pub fn with_exhausted_group_download(self, name: &str, attempts: u32) -> Self {
        *self.transport.group_script.lock().unwrap() = GroupScript::Exhausted {
            name: name.to_string(),
            attempts,
        };
        self
    }

    /// Script a single failure the transport is still going to retry.
    pub fn with_failed_group_download(
        self,
        name: &str,
        retry_count: u32,
        total_retry_count: u32,
    ) -> Self {
        *self.transport.group_script.lock().unwrap() = GroupScript::FailOnce {
            name: name.to_string(),
            retry_count,
            total_retry_count,
        };
        self
    }

    pub fn with_prompt_decision(self, decision: Decision) -> Self {
        *self.prompt.decision.lock().unwrap() = Some(decision);
        self
    }

    pub fn with_preload_items(self, names: &[&str]) -> Self {
        *self.loader.items.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Hold preload events back until `deliver_preload_item` is called.
    pub fn with_deferred_preload(self) -> Self {
        self.loader.deferred.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_preload_item(self, name: &str) -> Self {
        *self.loader.failing.lock().unwrap() = Some(name.to_string());
        self
    }

    /// Assemble the scripted services for a pipeline run.
    pub fn services(&self) -> PipelineServices {
        let manifest = ResourceManifest {
            version: self.manifest_version,
            resources: self
                .remote
                .iter()
                .map(|(name, compressed)| {
                    let hash = crc32(name.as_bytes());
                    (
                        name.clone(),
                        RemoteResource {
                            uncompressed_length: compressed * 2,
                            compressed_length: *compressed,
                            hash,
                            compressed_hash: hash.wrapping_add(1),
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        };

        if self.match_local {
            *self.store.local.lock().unwrap() = manifest
                .resources
                .iter()
                .map(|(name, meta)| {
                    (
                        name.clone(),
                        LocalResource {
                            length: meta.uncompressed_length,
                            hash: meta.hash,
                        },
                    )
                })
                .collect();
        }

        let plain = serde_json::to_vec(&manifest).expect("manifest serializes");
        if !self.no_manifest {
            *self.store.installed.lock().unwrap() = Some(plain.clone());
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&plain).expect("gzip write");
        let compressed = encoder.finish().expect("gzip finish");

        let version_manifest = crate::version::VersionManifest {
            latest_version_label: format!("{}.0.0", self.manifest_version),
            internal_version_number: self.manifest_version,
            force_update: self.force_update,
            download_root_uri: format!("https://cdn.example.com/{}", self.manifest_version),
            resource_manifest_length: plain.len() as u64,
            resource_manifest_hash: crc32(&plain),
            resource_manifest_compressed_length: compressed.len() as u64,
            resource_manifest_compressed_hash: crc32(&compressed),
        };
        *self.transport.version_bytes.lock().unwrap() =
            Some(serde_json::to_vec(&version_manifest).expect("version manifest serializes"));
        *self.transport.manifest_bytes.lock().unwrap() = Some(compressed);

        let build_info = BuildInfo {
            version_label: "1.0.0".to_string(),
            internal_version: self.store.local_version(),
            check_version_url: "https://dist.example.com/{platform}/version.json".to_string(),
            update_url: "https://example.com/get-latest".to_string(),
        };
        let config = BootstrapConfig::new(self.mode)
            .with_first_scene(self.first_scene)
            .with_metered_network(self.metered);

        PipelineServices::new(
            self.transport.clone(),
            self.store.clone(),
            self.loader.clone(),
            self.sink.clone(),
            self.prompt.clone(),
            build_info,
            config,
        )
    }

    pub fn prompt_calls(&self) -> usize {
        self.prompt.calls.load(Ordering::SeqCst)
    }

    pub fn group_download_calls(&self) -> usize {
        self.transport.group_calls.load(Ordering::SeqCst)
    }

    pub fn progress_reports(&self) -> Vec<(f64, String)> {
        self.sink.reports.lock().unwrap().clone()
    }

    /// Deliver one deferred preload completion.
    pub fn deliver_preload_item(&self, name: &str) {
        if let Some(sender) = self.pending_sender() {
            let _ = sender.send(PreloadEvent::ItemLoaded {
                name: name.to_string(),
            });
        }
    }

    fn pending_sender(&self) -> Option<Sender<PreloadEvent>> {
        self.loader.pending.lock().unwrap().clone()
    }
}
