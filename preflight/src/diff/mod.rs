//! Resource diff engine.
//!
//! Compares the local resource index against the verified remote manifest
//! and produces the needs-fetch queue for the download state. Every remote
//! entry is classified as *unchanged*, *moved* (same content under a
//! different name, counted but not downloaded), or *needs-fetch* (absent or
//! hash-mismatched); local entries absent remotely are *removed*.
//!
//! The computation is deterministic and side-effect-free except for the
//! removals, which are applied to the store immediately. A removal failure
//! is logged, never fatal.

use std::collections::{BTreeMap, HashMap};
use std::collections::btree_map;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::services::ResourceStore;
use crate::transfer::SessionTotals;

/// Metadata for one resource as declared by the remote manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteResource {
    pub uncompressed_length: u64,
    pub compressed_length: u64,
    /// CRC32 of the uncompressed bundle.
    pub hash: u32,
    /// CRC32 of the compressed bundle.
    pub compressed_hash: u32,
}

/// Metadata for one locally installed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalResource {
    pub length: u64,
    pub hash: u32,
}

/// The verified remote resource manifest: internal version plus the full
/// name-to-metadata map. Names are kept ordered so diff output is stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceManifest {
    pub version: u32,
    pub resources: BTreeMap<String, RemoteResource>,
}

impl ResourceManifest {
    /// Parse a resource manifest from uncompressed bytes.
    pub fn parse(bytes: &[u8]) -> PipelineResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| PipelineError::ManifestParse {
            reason: e.to_string(),
        })
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, RemoteResource> {
        self.resources.iter()
    }
}

/// One resource the download state must fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUpdateEntry {
    pub name: String,
    pub uncompressed_length: u64,
    pub compressed_length: u64,
    /// Expected CRC32 of the uncompressed bundle.
    pub expected_hash: u32,
    /// Expected CRC32 of the compressed bundle.
    pub expected_compressed_hash: u32,
}

/// Result of diffing local resources against the remote manifest.
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// Resources to fetch, ordered by name.
    pub to_fetch: Vec<ResourceUpdateEntry>,
    /// Remote names satisfied by identical local content under another name.
    pub moved: Vec<String>,
    /// Local names deleted because they no longer exist remotely.
    pub removed: Vec<String>,
    /// Totals derived from the needs-fetch set, for progress computation.
    pub totals: SessionTotals,
}

impl DiffOutcome {
    /// Whether any resources must be downloaded.
    pub fn needs_update(&self) -> bool {
        !self.to_fetch.is_empty()
    }
}

/// Diff the local index against the remote manifest.
///
/// Removals of local-only resources are applied through `store` as they
/// are found; a failed removal is logged and skipped.
pub fn diff_resources(
    local: &HashMap<String, LocalResource>,
    remote: &ResourceManifest,
    store: &dyn ResourceStore,
) -> DiffOutcome {
    // Local entries with no remote counterpart, ordered for determinism.
    // Entries here either back a moved remote resource or get removed.
    let mut local_only: BTreeMap<&str, LocalResource> = local
        .iter()
        .filter(|(name, _)| !remote.resources.contains_key(*name))
        .map(|(name, meta)| (name.as_str(), *meta))
        .collect();

    let mut to_fetch = Vec::new();
    let mut moved = Vec::new();

    for (name, meta) in remote.iter() {
        match local.get(name) {
            Some(installed)
                if installed.hash == meta.hash && installed.length == meta.uncompressed_length =>
            {
                // Unchanged.
            }
            Some(_) => {
                to_fetch.push(entry_for(name, meta));
            }
            None => {
                let relocated = local_only
                    .iter()
                    .find(|(_, m)| m.hash == meta.hash && m.length == meta.uncompressed_length)
                    .map(|(n, _)| n.to_string());

                if let Some(source) = relocated {
                    local_only.remove(source.as_str());
                    moved.push(name.clone());
                } else {
                    to_fetch.push(entry_for(name, meta));
                }
            }
        }
    }

    let mut removed = Vec::new();
    for name in local_only.keys() {
        match store.apply_removal(name) {
            Ok(()) => removed.push(name.to_string()),
            Err(e) => warn!(name, error = %e, "failed to remove stale resource"),
        }
    }

    let totals = SessionTotals::new(
        to_fetch.len(),
        to_fetch.iter().map(|e| e.compressed_length).sum(),
    );

    info!(
        needs_fetch = totals.resource_count,
        moved = moved.len(),
        removed = removed.len(),
        total_compressed_bytes = totals.total_compressed_bytes,
        "resource diff complete"
    );

    DiffOutcome {
        to_fetch,
        moved,
        removed,
        totals,
    }
}

fn entry_for(name: &str, meta: &RemoteResource) -> ResourceUpdateEntry {
    ResourceUpdateEntry {
        name: name.to_string(),
        uncompressed_length: meta.uncompressed_length,
        compressed_length: meta.compressed_length,
        expected_hash: meta.hash,
        expected_compressed_hash: meta.compressed_hash,
    }
}
