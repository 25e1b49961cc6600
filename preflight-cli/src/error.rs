//! CLI error type.

use std::error::Error;
use std::fmt;

use preflight::services::StoreError;

/// Errors surfaced to the command-line user.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or missing configuration.
    Config(String),
    /// Resource store failure.
    Store(StoreError),
    /// Transport could not be constructed.
    Transport(String),
    /// Signal handler installation failed.
    Interrupt(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(reason) => write!(f, "configuration error: {}", reason),
            CliError::Store(err) => write!(f, "resource store error: {}", err),
            CliError::Transport(reason) => write!(f, "transport error: {}", reason),
            CliError::Interrupt(reason) => write!(f, "signal handler error: {}", reason),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CliError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        CliError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_reason() {
        let err = CliError::Config("missing check_version_url".to_string());
        assert!(err.to_string().contains("missing check_version_url"));
    }
}
