//! Resolver worker threads
//!
//! Each worker:
//! - Pulls scan entries from the dispatch queue
//! - Resolves them into records (symlink, stat, owner/group)
//! - Sends records to the serializer
//!
//! A worker exits when the dispatch queue is closed and drained, or as
//! soon as the record stream has no receiver left.

use crate::error::WorkerError;
use crate::fs::{EntryResolver, FileRecord, ScanEntry};
use crate::walker::stats::WalkStats;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// A worker thread that resolves dispatched entries
pub struct ResolverWorker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<()>>,
}

impl ResolverWorker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        resolver: Arc<EntryResolver>,
        entries: Receiver<ScanEntry>,
        records: Sender<FileRecord>,
        stats: Arc<WalkStats>,
    ) -> Result<Self, WorkerError> {
        let name = format!("resolver-{}", id);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(id, resolver, entries, records, stats))
            .map_err(|e| WorkerError::SpawnFailed {
                name,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
        })
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|payload| WorkerError::from_panic(&format!("resolver-{}", self.id), payload)),
            None => Ok(()),
        }
    }
}

fn worker_loop(
    id: usize,
    resolver: Arc<EntryResolver>,
    entries: Receiver<ScanEntry>,
    records: Sender<FileRecord>,
    stats: Arc<WalkStats>,
) {
    trace!("Resolver {} started", id);
    let mut resolved = 0u64;

    while let Ok(entry) = entries.recv() {
        let Some(record) = resolver.resolve(&entry) else {
            stats.record_dropped();
            continue;
        };

        stats.record_emitted(&record);
        if records.send(record).is_err() {
            debug!("Resolver {} stopping: record stream closed", id);
            break;
        }
        resolved += 1;
    }

    trace!("Resolver {} finished after {} records", id, resolved);
}
