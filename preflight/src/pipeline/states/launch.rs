//! Launch and splash: one-shot startup states.

use std::time::Duration;

use tracing::{debug, info};

use crate::config::LaunchMode;
use crate::pipeline::machine::PipelineServices;
use crate::pipeline::state::{PipelineState, Transition};

use super::{CheckVersion, InitResources, Preload};

/// Initial state: publish build info, then advance on the next tick.
#[derive(Debug, Default)]
pub struct Launch;

impl Launch {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineState for Launch {
    fn name(&self) -> &'static str {
        "Launch"
    }

    fn enter(&mut self, services: &mut PipelineServices) {
        info!(
            version = %services.build_info.version_label,
            internal_version = services.build_info.internal_version,
            platform = services.config.platform.path_suffix(),
            "client launching"
        );
    }

    fn poll(&mut self, _services: &mut PipelineServices, _dt: Duration) -> Transition {
        Transition::To(Box::new(Splash::new()))
    }
}

/// Splash screen tick; branches on the configured launch mode.
#[derive(Debug, Default)]
pub struct Splash;

impl Splash {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineState for Splash {
    fn name(&self) -> &'static str {
        "Splash"
    }

    fn enter(&mut self, _services: &mut PipelineServices) {}

    fn poll(&mut self, services: &mut PipelineServices, _dt: Duration) -> Transition {
        match services.config.mode {
            LaunchMode::Passthrough => {
                debug!("passthrough mode, skipping resource checks");
                Transition::To(Box::new(Preload::new()))
            }
            LaunchMode::Package => Transition::To(Box::new(InitResources::new())),
            LaunchMode::Updatable => Transition::To(Box::new(CheckVersion::new())),
        }
    }
}
