//! Error types for the bootstrap pipeline.

use std::fmt;

use crate::services::StoreError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while the bootstrap pipeline runs.
///
/// Component-local failures (a single resource retry, a diff mismatch) are
/// absorbed inside their owning state; only the failures below are recorded
/// on the pipeline itself. None of them crash the process: a state that
/// hits one simply never sets its completion latch, and the stall is
/// surfaced through `PipelineMachine::status()`.
#[derive(Debug)]
pub enum PipelineError {
    /// Downloaded manifest bytes did not decode into a well-formed document.
    ManifestParse { reason: String },

    /// A transport-level fetch failed.
    Network { url: String, reason: String },

    /// Downloaded data did not match its expected hash.
    HashMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    /// Downloaded data did not match its expected length.
    LengthMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// A resource exhausted its retry budget and the session is fatal.
    RetriesExhausted { name: String, attempts: u32 },

    /// A preload item failed to load.
    PreloadFailed { name: String, reason: String },

    /// Resource store operation failed.
    Store(StoreError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManifestParse { reason } => {
                write!(f, "failed to parse manifest: {}", reason)
            }
            Self::Network { url, reason } => {
                write!(f, "network request to {} failed: {}", url, reason)
            }
            Self::HashMismatch {
                name,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "hash mismatch for {}: expected {:08x}, got {:08x}",
                    name, expected, actual
                )
            }
            Self::LengthMismatch {
                name,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "length mismatch for {}: expected {} bytes, got {}",
                    name, expected, actual
                )
            }
            Self::RetriesExhausted { name, attempts } => {
                write!(
                    f,
                    "resource {} failed after {} attempts; session is fatal",
                    name, attempts
                )
            }
            Self::PreloadFailed { name, reason } => {
                write!(f, "failed to preload {}: {}", name, reason)
            }
            Self::Store(e) => write!(f, "resource store error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parse_display() {
        let err = PipelineError::ManifestParse {
            reason: "unexpected end of input".to_string(),
        };
        assert!(err.to_string().contains("failed to parse manifest"));
    }

    #[test]
    fn test_hash_mismatch_display() {
        let err = PipelineError::HashMismatch {
            name: "bundle_a".to_string(),
            expected: 0xdeadbeef,
            actual: 0x0badf00d,
        };
        let text = err.to_string();
        assert!(text.contains("bundle_a"));
        assert!(text.contains("deadbeef"));
        assert!(text.contains("0badf00d"));
    }

    #[test]
    fn test_retries_exhausted_display() {
        let err = PipelineError::RetriesExhausted {
            name: "bundle_c".to_string(),
            attempts: 3,
        };
        assert!(err.to_string().contains("session is fatal"));
    }
}
