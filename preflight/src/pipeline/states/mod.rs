//! Pipeline state implementations, one module per leg of the flow.

mod handoff;
mod launch;
mod resources;
mod update;
mod version;

pub use handoff::{ChangeScene, Preload};
pub use launch::{Launch, Splash};
pub use resources::{CheckResources, InitResources, VerifyResources};
pub use update::{ResourceUpdatePayload, UpdateResources};
pub use version::{CheckVersion, UpdateVersion};
