//! On-disk resource store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/index.json       local resource index (version + name/length/hash)
//! <root>/resources.json   installed remote manifest, uncompressed
//! <root>/bundles/<name>   resource payloads
//! ```
//!
//! The index is the source of truth for what is installed; the bundle
//! files back it. Verification reconciles the two by dropping index
//! entries whose files are missing or corrupt, so the next diff fetches
//! them again.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::diff::{LocalResource, ResourceManifest};
use crate::services::{InitEvent, ResourceStore, StoreError, VerifyEvent};
use crate::version::crc32;

const INDEX_FILE: &str = "index.json";
const MANIFEST_FILE: &str = "resources.json";
const BUNDLES_DIR: &str = "bundles";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    length: u64,
    hash: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LocalIndex {
    version: u32,
    resources: BTreeMap<String, IndexEntry>,
}

/// Resource store persisting bundles and the index under one directory.
pub struct DiskResourceStore {
    root: PathBuf,
    index: Arc<Mutex<LocalIndex>>,
    download_root: Mutex<Option<String>>,
}

impl DiskResourceStore {
    /// Open or create a store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::WriteFailed` when the directory layout cannot
    /// be created, or `StoreError::ReadFailed` when an existing index
    /// cannot be loaded.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let bundles = root.join(BUNDLES_DIR);
        fs::create_dir_all(&bundles).map_err(|e| StoreError::WriteFailed {
            path: bundles.display().to_string(),
            reason: e.to_string(),
        })?;

        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            load_index(&index_path)?
        } else {
            LocalIndex::default()
        };

        Ok(Self {
            root,
            index: Arc::new(Mutex::new(index)),
            download_root: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn bundle_path(&self, name: &str) -> PathBuf {
        self.root.join(BUNDLES_DIR).join(name)
    }

    fn persist_index(&self, index: &LocalIndex) -> Result<(), StoreError> {
        save_index(&self.index_path(), index)
    }
}

fn load_index(path: &Path) -> Result<LocalIndex, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn save_index(path: &Path, index: &LocalIndex) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(index).map_err(|e| StoreError::WriteFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    fs::write(path, bytes).map_err(|e| StoreError::WriteFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

impl ResourceStore for DiskResourceStore {
    fn local_version(&self) -> u32 {
        self.index.lock().unwrap().version
    }

    fn list_local(&self) -> HashMap<String, LocalResource> {
        self.index
            .lock()
            .unwrap()
            .resources
            .iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    LocalResource {
                        length: entry.length,
                        hash: entry.hash,
                    },
                )
            })
            .collect()
    }

    fn apply_removal(&self, name: &str) -> Result<(), StoreError> {
        let path = self.bundle_path(name);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| StoreError::RemovalFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        }

        let mut index = self.index.lock().unwrap();
        index.resources.remove(name);
        self.persist_index(&index)
    }

    fn set_download_root(&self, url: &str) {
        *self.download_root.lock().unwrap() = Some(url.to_string());
    }

    fn install_version_manifest(&self, bytes: &[u8]) -> Result<(), StoreError> {
        // Validate before anything touches the disk.
        let manifest =
            ResourceManifest::parse(bytes).map_err(|e| StoreError::InvalidManifest {
                reason: e.to_string(),
            })?;

        let path = self.manifest_path();
        fs::write(&path, bytes).map_err(|e| StoreError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut index = self.index.lock().unwrap();
        index.version = manifest.version;
        self.persist_index(&index)?;
        info!(version = manifest.version, "resource manifest installed");
        Ok(())
    }

    fn load_remote_manifest(&self) -> Result<ResourceManifest, StoreError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Err(StoreError::NoManifest);
        }
        let bytes = fs::read(&path).map_err(|e| StoreError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        ResourceManifest::parse(&bytes).map_err(|e| StoreError::InvalidManifest {
            reason: e.to_string(),
        })
    }

    fn commit_resource(&self, name: &str, data: &[u8], hash: u32) -> Result<(), StoreError> {
        let path = self.bundle_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::WriteFailed {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        fs::write(&path, data).map_err(|e| StoreError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut index = self.index.lock().unwrap();
        index.resources.insert(
            name.to_string(),
            IndexEntry {
                length: data.len() as u64,
                hash,
            },
        );
        self.persist_index(&index)
    }

    fn begin_verify(&self, events: Sender<VerifyEvent>) {
        let index = Arc::clone(&self.index);
        let root = self.root.clone();

        thread::spawn(move || {
            let snapshot: Vec<(String, IndexEntry)> = {
                let index = index.lock().unwrap();
                index
                    .resources
                    .iter()
                    .map(|(name, entry)| (name.clone(), *entry))
                    .collect()
            };

            let mut invalid_names = Vec::new();
            for (name, entry) in &snapshot {
                let path = root.join(BUNDLES_DIR).join(name);
                let valid = match fs::read(&path) {
                    Ok(data) => {
                        data.len() as u64 == entry.length && crc32(&data) == entry.hash
                    }
                    Err(_) => false,
                };
                if !valid {
                    warn!(name, "installed resource failed verification");
                    fs::remove_file(&path).ok();
                    invalid_names.push(name.clone());
                }
            }

            if !invalid_names.is_empty() {
                let mut index = index.lock().unwrap();
                for name in &invalid_names {
                    index.resources.remove(name);
                }
                if let Err(e) = save_index(&root.join(INDEX_FILE), &index) {
                    warn!(error = %e, "failed to persist index after verification");
                }
            }

            let _ = events.send(VerifyEvent::Completed {
                checked: snapshot.len(),
                invalid: invalid_names.len(),
            });
        });
    }

    fn begin_init(&self, events: Sender<InitEvent>) {
        let index = Arc::clone(&self.index);
        let root = self.root.clone();

        thread::spawn(move || {
            let bundles = root.join(BUNDLES_DIR);
            let mut resources = BTreeMap::new();

            if let Ok(dir) = fs::read_dir(&bundles) {
                for entry in dir.flatten() {
                    let path = entry.path();
                    if !path.is_file() {
                        continue;
                    }
                    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    match fs::read(&path) {
                        Ok(data) => {
                            resources.insert(
                                name.to_string(),
                                IndexEntry {
                                    length: data.len() as u64,
                                    hash: crc32(&data),
                                },
                            );
                        }
                        Err(e) => warn!(name, error = %e, "skipping unreadable bundle"),
                    }
                }
            }

            {
                let mut index = index.lock().unwrap();
                index.resources = resources;
                if let Err(e) = save_index(&root.join(INDEX_FILE), &index) {
                    warn!(error = %e, "failed to persist index after initialization");
                }
                info!(
                    resources = index.resources.len(),
                    "package resources initialized"
                );
            }

            let _ = events.send(InitEvent::Completed);
        });
    }
}
