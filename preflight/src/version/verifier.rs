//! Update decision and manifest payload verification.

use std::io::Read;

use flate2::read::GzDecoder;
use flate2::Crc;
use tracing::{debug, info};

use super::manifest::VersionManifest;
use crate::error::{PipelineError, PipelineResult};

/// Expected length/hash pairs for the resource manifest download.
///
/// This is the typed payload handed from the version check to the manifest
/// update state; it replaces loose key/value passing between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionUpdatePayload {
    pub length: u64,
    pub hash: u32,
    pub compressed_length: u64,
    pub compressed_hash: u32,
}

/// Outcome of comparing the server manifest against the local version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// Local resources are current; skip the manifest update.
    UpToDate,
    /// A newer resource set exists; fetch the manifest described by the
    /// payload.
    UpdateNeeded(VersionUpdatePayload),
    /// The client binary is too old; abort into the update-redirect flow.
    ForceUpdate,
}

/// Decide whether an update is needed.
///
/// `force_update` short-circuits everything else. Otherwise the rule is
/// strict comparison: a remote internal version greater than the local one
/// means "update needed", equal or older means "up to date".
pub fn check_version(manifest: &VersionManifest, local_version: u32) -> VersionCheck {
    if manifest.force_update {
        return VersionCheck::ForceUpdate;
    }

    info!(
        latest = %manifest.latest_version_label,
        remote_version = manifest.internal_version_number,
        local_version,
        "version check complete"
    );

    if local_version < manifest.internal_version_number {
        VersionCheck::UpdateNeeded(VersionUpdatePayload {
            length: manifest.resource_manifest_length,
            hash: manifest.resource_manifest_hash,
            compressed_length: manifest.resource_manifest_compressed_length,
            compressed_hash: manifest.resource_manifest_compressed_hash,
        })
    } else {
        VersionCheck::UpToDate
    }
}

/// CRC32 of a byte slice.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(bytes);
    crc.sum()
}

/// Verify a downloaded resource manifest against its expected length/hash
/// pairs and return the inflated bytes.
///
/// The compressed form is checked first, then the payload is gunzipped and
/// the plain form is checked.
///
/// # Errors
///
/// `LengthMismatch`/`HashMismatch` when the data does not match the
/// payload, or `ManifestParse` when the compressed stream is not valid
/// gzip.
pub fn verify_payload(compressed: &[u8], payload: &VersionUpdatePayload) -> PipelineResult<Vec<u8>> {
    if compressed.len() as u64 != payload.compressed_length {
        return Err(PipelineError::LengthMismatch {
            name: "resource manifest (compressed)".to_string(),
            expected: payload.compressed_length,
            actual: compressed.len() as u64,
        });
    }

    let actual_compressed_hash = crc32(compressed);
    if actual_compressed_hash != payload.compressed_hash {
        return Err(PipelineError::HashMismatch {
            name: "resource manifest (compressed)".to_string(),
            expected: payload.compressed_hash,
            actual: actual_compressed_hash,
        });
    }

    let mut plain = Vec::with_capacity(payload.length as usize);
    GzDecoder::new(compressed)
        .read_to_end(&mut plain)
        .map_err(|e| PipelineError::ManifestParse {
            reason: format!("failed to inflate resource manifest: {}", e),
        })?;

    if plain.len() as u64 != payload.length {
        return Err(PipelineError::LengthMismatch {
            name: "resource manifest".to_string(),
            expected: payload.length,
            actual: plain.len() as u64,
        });
    }

    let actual_hash = crc32(&plain);
    if actual_hash != payload.hash {
        return Err(PipelineError::HashMismatch {
            name: "resource manifest".to_string(),
            expected: payload.hash,
            actual: actual_hash,
        });
    }

    debug!(
        length = payload.length,
        compressed_length = payload.compressed_length,
        "resource manifest verified"
    );

    Ok(plain)
}
