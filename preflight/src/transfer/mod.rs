//! Transfer bookkeeping for the resource download session.
//!
//! - Per-resource byte tracking and aggregate progress (`tracker`)
//! - Continue-vs-abandon retry decisions (`retry`)

mod retry;
mod tracker;

pub use retry::{RetryDecision, RetryPolicy};
pub use tracker::{format_bytes, SessionTotals, TransferTracker};
