//! Version manifest parsing and verification.
//!
//! The distribution server declares the latest release in a small JSON
//! document (`manifest`). The verifier (`verifier`) decides whether an
//! update is needed by comparing internal version numbers, and validates
//! downloaded manifest payloads against their expected length/hash pairs.

mod manifest;
mod verifier;

pub use manifest::VersionManifest;
pub use verifier::{check_version, crc32, verify_payload, VersionCheck, VersionUpdatePayload};
