//! Per-resource transfer tracking and aggregate progress.

use std::collections::HashMap;

use tracing::{debug, warn};

/// Session-wide totals derived once at diff time.
///
/// Used purely for progress-ratio computation; control decisions come from
/// completion events, never from these counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTotals {
    /// Number of resources in the needs-fetch set.
    pub resource_count: usize,
    /// Sum of the compressed lengths of the needs-fetch set.
    pub total_compressed_bytes: u64,
    /// Resources successfully downloaded so far.
    pub success_count: usize,
}

impl SessionTotals {
    pub fn new(resource_count: usize, total_compressed_bytes: u64) -> Self {
        Self {
            resource_count,
            total_compressed_bytes,
            success_count: 0,
        }
    }
}

/// Tracks in-flight and completed byte counts per resource name.
///
/// At most one record exists per name; a duplicate start is treated as a
/// restart and resets the record to zero. All events are idempotent with
/// respect to duplicate delivery; a completed record ignores further
/// events for its name until it is restarted.
#[derive(Debug)]
pub struct TransferTracker {
    records: HashMap<String, TransferRecord>,
    totals: SessionTotals,
}

#[derive(Debug, Default)]
struct TransferRecord {
    bytes: u64,
    done: bool,
}

impl TransferTracker {
    /// Create a tracker for a session with the given totals.
    pub fn new(totals: SessionTotals) -> Self {
        Self {
            records: HashMap::with_capacity(totals.resource_count),
            totals,
        }
    }

    /// A transfer started. An existing record for the name is reset to
    /// zero rather than duplicated.
    pub fn start(&mut self, name: &str) {
        if let Some(old) = self
            .records
            .insert(name.to_string(), TransferRecord::default())
        {
            debug!(name, discarded_bytes = old.bytes, "transfer restarted");
        }
    }

    /// Bytes-so-far update for an in-flight transfer. An update for an
    /// unknown name is a protocol error: logged and ignored. An update for
    /// a completed transfer is late delivery: ignored so the final length
    /// stands.
    pub fn progress(&mut self, name: &str, bytes_so_far: u64) {
        match self.records.get_mut(name) {
            Some(record) if record.done => {
                debug!(name, "progress after completion ignored")
            }
            Some(record) => record.bytes = bytes_so_far,
            None => warn!(name, "progress for unknown transfer ignored"),
        }
    }

    /// A transfer completed; record its final compressed length. A repeat
    /// success for an already-completed name is duplicate delivery and
    /// counts nothing.
    pub fn success(&mut self, name: &str, final_compressed_length: u64) {
        match self.records.get_mut(name) {
            Some(record) if record.done => {
                debug!(name, "duplicate success ignored")
            }
            Some(record) => {
                record.bytes = final_compressed_length;
                record.done = true;
                self.totals.success_count += 1;
            }
            None => warn!(name, "success for unknown transfer ignored"),
        }
    }

    /// Drop a record so partial bytes of a failed transfer don't skew the
    /// total while the transport retries it.
    pub fn remove(&mut self, name: &str) {
        if self.records.remove(name).is_none() {
            warn!(name, "removal of unknown transfer ignored");
        }
    }

    /// Total bytes transferred across all current records.
    pub fn bytes_transferred(&self) -> u64 {
        self.records.values().map(|r| r.bytes).sum()
    }

    /// Aggregate progress ratio, clamped to `[0, 1]`.
    pub fn ratio(&self) -> f64 {
        if self.totals.total_compressed_bytes == 0 {
            return if self.totals.resource_count == 0 { 1.0 } else { 0.0 };
        }
        let ratio =
            self.bytes_transferred() as f64 / self.totals.total_compressed_bytes as f64;
        ratio.clamp(0.0, 1.0)
    }

    pub fn totals(&self) -> &SessionTotals {
        &self.totals
    }

    /// Human-readable progress line for the display collaborator.
    ///
    /// `bytes_per_second` is the transport-sampled throughput, passed
    /// through for formatting only.
    pub fn progress_text(&self, bytes_per_second: u64) -> String {
        format!(
            "{}/{} resources, {} of {} ({:.0}%) at {}/s",
            self.totals.success_count,
            self.totals.resource_count,
            format_bytes(self.bytes_transferred()),
            format_bytes(self.totals.total_compressed_bytes),
            self.ratio() * 100.0,
            format_bytes(bytes_per_second),
        )
    }
}

/// Format a byte count with binary-threshold units.
pub fn format_bytes(len: u64) -> String {
    const KB: u64 = 1 << 10;
    const MB: u64 = 1 << 20;
    const GB: u64 = 1 << 30;
    const TB: u64 = 1 << 40;

    if len < KB {
        format!("{} B", len)
    } else if len < MB {
        format!("{:.2} KB", len as f64 / KB as f64)
    } else if len < GB {
        format!("{:.2} MB", len as f64 / MB as f64)
    } else if len < TB {
        format!("{:.2} GB", len as f64 / GB as f64)
    } else {
        format!("{:.2} TB", len as f64 / TB as f64)
    }
}
