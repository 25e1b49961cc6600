//! The bootstrap pipeline state machine.
//!
//! A single logical thread of control drives the pipeline: the embedding
//! application calls [`PipelineMachine::tick`] once per scheduler frame,
//! the current state polls the channels it owns, and transitions carry
//! strongly-typed payloads into the next state's constructor.
//!
//! # States
//!
//! ```text
//! Launch ──► Splash ──┬─► CheckVersion ──► (UpdateVersion) ──► VerifyResources
//!                     │         │                                    │
//!                     │         └─ force update ─► prompt ─► abort   ▼
//!                     │                                       CheckResources
//!                     ├─► InitResources ──► Preload ◄── (UpdateResources)
//!                     │                        │
//!                     └──────────────────────► Preload ──► ChangeScene ──► handoff
//! ```
//!
//! A state advances only when its completion latch is set by an event it
//! drained from its own channel; a failed collaborator call leaves the
//! latch unset and the pipeline stalls in place, surfaced through
//! [`PipelineMachine::status`] rather than a crash.

mod machine;
mod state;
pub mod states;

#[cfg(test)]
pub(crate) mod testkit;

pub use machine::{MachineStatus, PipelineMachine, PipelineOutcome, PipelineServices};
pub use state::{AbortReason, PipelineState, SceneRequest, Transition};
