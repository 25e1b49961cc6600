//! Bootstrap configuration and build metadata.
//!
//! `BuildInfo` carries the release facts shipped inside the client binary
//! (version label, internal version number, server URLs). `BootstrapConfig`
//! carries the tunables the embedding application decides at startup
//! (launch mode, retry budget, download parallelism).

use std::time::Duration;

/// How the client resolves its resources at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Development passthrough: skip all version/resource checks.
    Passthrough,
    /// Resources ship with the binary; initialize them locally, never update.
    Package,
    /// Resources are updatable from the distribution server.
    Updatable,
}

/// Target platform, used to parameterize the version-check URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Platform path suffix substituted into the version-check URL.
    pub fn path_suffix(self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "MacOS",
            Platform::Linux => "Linux",
        }
    }

    /// Detect the platform the client was built for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// Release facts baked into the shipped client.
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Human-readable version label of this build.
    pub version_label: String,

    /// Internal numeric version of the resources shipped with this build.
    pub internal_version: u32,

    /// Version-check URL template. `{platform}` is replaced with the
    /// platform path suffix before the request is issued.
    pub check_version_url: String,

    /// External update channel the user is redirected to on forced update.
    pub update_url: String,
}

impl BuildInfo {
    /// Resolve the version-check URL for the given platform.
    pub fn check_version_url_for(&self, platform: Platform) -> String {
        self.check_version_url
            .replace("{platform}", platform.path_suffix())
    }
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            version_label: "0.0.0".to_string(),
            internal_version: 0,
            check_version_url: String::new(),
            update_url: String::new(),
        }
    }
}

/// Configuration for one bootstrap run.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Resource resolution mode.
    pub mode: LaunchMode,

    /// Platform used for URL parameterization.
    pub platform: Platform,

    /// Scene the pipeline hands off to once preloading completes.
    pub first_scene_id: u32,

    /// Whether the client is on a metered network and must confirm before
    /// downloading resources.
    pub metered_network: bool,

    /// File name of the resource manifest under the download root.
    pub resource_manifest_name: String,

    /// Session-level ceiling on per-resource download attempts.
    pub max_retry_attempts: u32,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Maximum concurrent resource downloads.
    pub parallel_downloads: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            mode: LaunchMode::Updatable,
            platform: Platform::current(),
            first_scene_id: 1,
            metered_network: false,
            resource_manifest_name: "resources.json.gz".to_string(),
            max_retry_attempts: 3,
            timeout: Duration::from_secs(30),
            parallel_downloads: 4,
        }
    }
}

impl BootstrapConfig {
    /// Create a configuration for the given launch mode.
    pub fn new(mode: LaunchMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Set the scene handed off to after preloading.
    pub fn with_first_scene(mut self, scene_id: u32) -> Self {
        self.first_scene_id = scene_id;
        self
    }

    /// Mark the network as metered, requiring confirmation before downloads.
    pub fn with_metered_network(mut self, metered: bool) -> Self {
        self.metered_network = metered;
        self
    }

    /// Set the per-resource retry ceiling.
    pub fn with_max_retries(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }
}
