//! Walk counters shared between the traversal thread and resolvers

use crate::fs::FileRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live walk statistics
#[derive(Debug, Default)]
pub struct WalkStats {
    /// Entries produced by traversal (any type)
    pub visited: AtomicU64,

    /// Entries handed to resolvers
    pub dispatched: AtomicU64,

    /// Records sent downstream
    pub records: AtomicU64,

    /// Records carrying an error (entry or traversal level)
    pub errors: AtomicU64,

    /// Traversal-level errors (unreadable directories etc.)
    pub traversal_errors: AtomicU64,

    /// Entries that resolved to a non-regular target
    pub dropped: AtomicU64,

    /// Sum of sizes of successfully resolved records
    pub bytes: AtomicU64,
}

impl WalkStats {
    pub(crate) fn record_visit(&self) {
        self.visited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_traversal_error(&self) {
        self.traversal_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a record that is about to be sent downstream
    pub(crate) fn record_emitted(&self, record: &FileRecord) {
        self.records.fetch_add(1, Ordering::Relaxed);
        if record.is_error() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        } else if let Some(size) = record.size {
            self.bytes.fetch_add(size, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> WalkCounts {
        WalkCounts {
            visited: self.visited.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            traversal_errors: self.traversal_errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`WalkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkCounts {
    pub visited: u64,
    pub dispatched: u64,
    pub records: u64,
    pub errors: u64,
    pub traversal_errors: u64,
    pub dropped: u64,
    pub bytes: u64,
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct WalkProgress {
    pub counts: WalkCounts,
    pub rows_written: u64,
    pub bytes_streamed: u64,
    pub total_workers: usize,
    pub elapsed: Duration,
}

impl WalkProgress {
    /// Records per second
    pub fn records_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.counts.records as f64 / secs
        } else {
            0.0
        }
    }
}
