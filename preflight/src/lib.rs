//! Preflight - client bootstrap and resource update pipeline.
//!
//! This library drives a client application from process start to its
//! first scene: check the server's declared version, update the resource
//! manifest, diff local resources against it, download what changed, and
//! preload startup content before handing off.
//!
//! # Architecture
//!
//! The pipeline core ([`pipeline`]) is a cooperative state machine ticked
//! by the embedding application. It never touches the network, the disk,
//! or the user directly; those concerns live behind the collaborator
//! traits in [`services`], with production implementations in
//! [`transport`] (blocking HTTP) and [`store`] (on-disk resource store).
//! Collaborators run on their own threads and complete operations by
//! sending events into channels owned by the requesting pipeline state.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use preflight::config::{BootstrapConfig, BuildInfo, LaunchMode};
//! use preflight::pipeline::{PipelineMachine, PipelineServices};
//! use preflight::store::DiskResourceStore;
//! use preflight::transport::HttpTransport;
//! # use std::sync::mpsc::Sender;
//! # use preflight::services::{ContentLoader, DecisionPrompt, PreloadEvent, ProgressSink, ConfirmRequest, Decision};
//! # struct NoLoader;
//! # impl ContentLoader for NoLoader {
//! #     fn begin_preload(&self, _: Sender<PreloadEvent>) -> usize { 0 }
//! # }
//! # struct NoSink;
//! # impl ProgressSink for NoSink {
//! #     fn report(&self, _: f64, _: &str) {}
//! # }
//! # struct NoPrompt;
//! # impl DecisionPrompt for NoPrompt {
//! #     fn confirm(&self, _: ConfirmRequest, reply: Sender<Decision>) {
//! #         let _ = reply.send(Decision::Cancelled);
//! #     }
//! # }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BootstrapConfig::new(LaunchMode::Updatable);
//! let build_info = BuildInfo {
//!     version_label: "1.4.2".to_string(),
//!     internal_version: 7,
//!     check_version_url: "https://dist.example.com/{platform}/version.json".to_string(),
//!     update_url: "https://example.com/download".to_string(),
//! };
//!
//! let store = Arc::new(DiskResourceStore::open("./resources")?);
//! let transport = Arc::new(HttpTransport::new(&config, store.clone())?);
//! let services = PipelineServices::new(
//!     transport,
//!     store,
//!     Arc::new(NoLoader),
//!     Arc::new(NoSink),
//!     Arc::new(NoPrompt),
//!     build_info,
//!     config,
//! );
//!
//! let mut machine = PipelineMachine::new(services);
//! while machine.tick(Duration::from_millis(16)).is_none() {
//!     std::thread::sleep(Duration::from_millis(16));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diff;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod transfer;
pub mod transport;
pub mod version;

pub use error::{PipelineError, PipelineResult};
