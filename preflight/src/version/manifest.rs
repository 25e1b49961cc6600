//! Server-declared version manifest.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Immutable description of the latest release, as declared by the server.
///
/// Fetched once per version check from the platform-parameterized URL,
/// consumed by the version verifier, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionManifest {
    /// Human-readable label of the latest release.
    pub latest_version_label: String,

    /// Internal numeric version compared against the local version.
    pub internal_version_number: u32,

    /// When set, the client binary itself is too old and the pipeline
    /// must abort into the update-redirect flow.
    pub force_update: bool,

    /// Root URL all resource downloads are fetched under.
    pub download_root_uri: String,

    /// Uncompressed length of the resource manifest file.
    pub resource_manifest_length: u64,

    /// CRC32 of the uncompressed resource manifest.
    pub resource_manifest_hash: u32,

    /// Compressed length of the resource manifest file.
    pub resource_manifest_compressed_length: u64,

    /// CRC32 of the compressed resource manifest.
    pub resource_manifest_compressed_hash: u32,
}

impl VersionManifest {
    /// Parse a version manifest from raw response bytes.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ManifestParse` when the bytes do not decode
    /// into a well-formed document.
    pub fn parse(bytes: &[u8]) -> PipelineResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| PipelineError::ManifestParse {
            reason: e.to_string(),
        })
    }
}
