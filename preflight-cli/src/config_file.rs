//! INI configuration file for the bootstrap CLI.
//!
//! Settings resolve in order: CLI argument, config file, built-in default.
//! The file lives at `<config dir>/preflight/config.ini` unless overridden
//! with `--config`.
//!
//! ```ini
//! [general]
//! mode = updatable
//! store_dir = /var/lib/preflight
//! first_scene = 1
//! internal_version = 7
//!
//! [network]
//! check_version_url = https://dist.example.com/{platform}/version.json
//! update_url = https://example.com/download
//! timeout = 30
//! parallel = 4
//! max_retries = 3
//! metered = false
//!
//! [preload]
//! files = menu.bundle, fonts.bundle
//! ```

use std::path::{Path, PathBuf};

use ini::Ini;

use preflight::config::LaunchMode;

use crate::error::CliError;

/// Parsed configuration file with defaults for every setting.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub mode: LaunchMode,
    pub store_dir: Option<PathBuf>,
    pub first_scene: u32,
    pub internal_version: u32,
    pub check_version_url: Option<String>,
    pub update_url: String,
    pub timeout_secs: u64,
    pub parallel: usize,
    pub max_retries: u32,
    pub metered: bool,
    pub preload_files: Vec<String>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            mode: LaunchMode::Updatable,
            store_dir: None,
            first_scene: 1,
            internal_version: 0,
            check_version_url: None,
            update_url: String::new(),
            timeout_secs: 30,
            parallel: 4,
            max_retries: 3,
            metered: false,
            preload_files: Vec::new(),
        }
    }
}

impl ConfigFile {
    /// Load a configuration file, applying defaults for missing keys.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Config` when the file cannot be read or contains
    /// an unrecognized launch mode.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let ini = Ini::load_from_file(path).map_err(|e| {
            CliError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        let mut config = Self::default();

        if let Some(section) = ini.section(Some("general")) {
            if let Some(value) = section.get("mode") {
                config.mode = parse_mode(value)?;
            }
            if let Some(value) = section.get("store_dir") {
                config.store_dir = Some(PathBuf::from(value));
            }
            if let Some(value) = section.get("first_scene") {
                config.first_scene = value.parse().unwrap_or(config.first_scene);
            }
            if let Some(value) = section.get("internal_version") {
                config.internal_version = value.parse().unwrap_or(config.internal_version);
            }
        }

        if let Some(section) = ini.section(Some("network")) {
            if let Some(value) = section.get("check_version_url") {
                config.check_version_url = Some(value.to_string());
            }
            if let Some(value) = section.get("update_url") {
                config.update_url = value.to_string();
            }
            if let Some(value) = section.get("timeout") {
                config.timeout_secs = value.parse().unwrap_or(config.timeout_secs);
            }
            if let Some(value) = section.get("parallel") {
                config.parallel = value.parse().unwrap_or(config.parallel);
            }
            if let Some(value) = section.get("max_retries") {
                config.max_retries = value.parse().unwrap_or(config.max_retries);
            }
            if let Some(value) = section.get("metered") {
                config.metered = value.eq_ignore_ascii_case("true") || value == "1";
            }
        }

        if let Some(section) = ini.section(Some("preload")) {
            if let Some(value) = section.get("files") {
                config.preload_files = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }

        Ok(config)
    }
}

fn parse_mode(value: &str) -> Result<LaunchMode, CliError> {
    match value.to_lowercase().as_str() {
        "passthrough" => Ok(LaunchMode::Passthrough),
        "package" => Ok(LaunchMode::Package),
        "updatable" => Ok(LaunchMode::Updatable),
        other => Err(CliError::Config(format!(
            "unknown launch mode '{}' (expected passthrough, package, or updatable)",
            other
        ))),
    }
}
