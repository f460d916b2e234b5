//! Tree walker - traversal thread plus resolver pool
//!
//! Architecture:
//! ```text
//! Traversal (caller thread, walkdir, depth-first)
//! │   skip dirs / devices / pattern mismatches
//! │   traversal errors ──────────────────────────┐
//! ▼                                              │
//! Dispatch queue (crossbeam bounded)             │
//! │                                              │
//! ├── Resolver 0: resolve → send record ─────────┤
//! ├── Resolver 1: resolve → send record ─────────┤
//! └── Resolver N: resolve → send record ─────────┤
//!                                                ▼
//!                              Record stream (crossbeam bounded, default rendezvous)
//! ```
//!
//! `run` returns only after traversal has finished and every resolver
//! has been joined, so a caller that drops its record sender after `run`
//! closes the stream strictly after the last record was delivered.

use crate::error::{Result, WalkError, WalkerError};
use crate::fs::resolver::path_string;
use crate::fs::{EntryResolver, EntryType, FileRecord, ScanEntry};
use crate::walker::stats::WalkStats;
use crate::walker::worker::ResolverWorker;
use crossbeam_channel::{bounded, Sender};
use regex::bytes::Regex;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Dispatch queue slots per resolver
const DISPATCH_SLOTS_PER_WORKER: usize = 64;

/// Walks a tree and streams one record per matched entry
pub struct TreeWalker {
    root: PathBuf,
    pattern: Regex,
    worker_count: usize,
    resolver: Arc<EntryResolver>,
    stats: Arc<WalkStats>,
}

impl TreeWalker {
    /// Create a walker rooted at `root` (made absolute)
    ///
    /// Fails if the root cannot be made absolute or does not exist.
    pub fn new(root: &Path, pattern: Regex, resolver: EntryResolver) -> std::result::Result<Self, WalkError> {
        let absolute = std::path::absolute(root).map_err(|source| WalkError::Root {
            path: root.to_path_buf(),
            source,
        })?;

        fs::symlink_metadata(&absolute).map_err(|source| WalkError::Root {
            path: absolute.clone(),
            source,
        })?;

        Ok(Self {
            root: absolute,
            pattern,
            worker_count: 1,
            resolver: Arc::new(resolver),
            stats: Arc::new(WalkStats::default()),
        })
    }

    /// Set the number of resolver threads (at least one)
    pub fn with_workers(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Inclusion pattern
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Number of resolver threads
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Absolute root of the walk
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared live statistics
    pub fn stats(&self) -> Arc<WalkStats> {
        Arc::clone(&self.stats)
    }

    /// Walk the tree, sending records on `records`
    ///
    /// Blocks until traversal is complete and all resolvers have
    /// delivered their records. Stops early (without error) if the
    /// record stream loses its receiver.
    pub fn run(&self, records: &Sender<FileRecord>) -> Result<()> {
        let start = Instant::now();
        let (entry_tx, entry_rx) = bounded::<ScanEntry>(self.worker_count * DISPATCH_SLOTS_PER_WORKER);

        let mut workers = Vec::with_capacity(self.worker_count);
        for id in 0..self.worker_count {
            match ResolverWorker::spawn(
                id,
                Arc::clone(&self.resolver),
                entry_rx.clone(),
                records.clone(),
                Arc::clone(&self.stats),
            ) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    drop(entry_tx);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e.into());
                }
            }
        }
        drop(entry_rx);

        debug!(root = %self.root.display(), workers = workers.len(), "Resolvers spawned");

        self.traverse(&entry_tx, records);

        // Closing the dispatch queue lets resolvers drain and exit
        drop(entry_tx);

        let mut first_panic: Option<WalkerError> = None;
        for worker in workers {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Resolver failed to join cleanly");
                first_panic.get_or_insert(e.into());
            }
        }

        let counts = self.stats.snapshot();
        info!(
            root = %self.root.display(),
            visited = counts.visited,
            records = counts.records,
            errors = counts.errors,
            duration_ms = start.elapsed().as_millis() as u64,
            "Walk finished"
        );

        match first_panic {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Depth-first traversal on the calling thread
    fn traverse(&self, entries: &Sender<ScanEntry>, records: &Sender<FileRecord>) {
        for item in WalkDir::new(&self.root).follow_links(false) {
            let dent = match item {
                Ok(dent) => dent,
                Err(e) => {
                    self.stats.record_traversal_error();
                    let path = path_string(e.path().unwrap_or(&self.root));
                    let not_found = e
                        .io_error()
                        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound);
                    if not_found {
                        // Common on live trees: entry removed mid-walk
                        debug!(path = %path, error = %e, "Traversal error");
                    } else {
                        warn!(path = %path, error = %e, "Traversal error");
                    }

                    let record = FileRecord::failed(path, e.to_string());
                    self.stats.record_emitted(&record);
                    if records.send(record).is_err() {
                        debug!("Record stream closed, stopping traversal");
                        return;
                    }
                    continue;
                }
            };

            self.stats.record_visit();

            let entry_type = EntryType::from_file_type(dent.file_type());
            if !entry_type.is_recordable() {
                continue;
            }
            if !self.pattern.is_match(dent.path().as_os_str().as_bytes()) {
                continue;
            }

            if entries.send(ScanEntry::new(dent.into_path(), entry_type)).is_err() {
                debug!("All resolvers gone, stopping traversal");
                return;
            }
            self.stats.record_dispatch();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::os::unix::fs::symlink;
    use std::os::unix::net::UnixListener;
    use tempfile::tempdir;

    fn collect(walker: &TreeWalker) -> Vec<FileRecord> {
        let (tx, rx) = unbounded();
        walker.run(&tx).unwrap();
        drop(tx);
        rx.iter().collect()
    }

    #[test]
    fn test_missing_root_fails_fast() {
        let dir = tempdir().unwrap();
        let result = TreeWalker::new(
            &dir.path().join("does-not-exist"),
            Regex::new("").unwrap(),
            EntryResolver::system(),
        );
        assert!(matches!(result, Err(WalkError::Root { .. })));
    }

    #[test]
    fn test_relative_root_is_absolutized() {
        let walker = TreeWalker::new(Path::new("."), Regex::new("").unwrap(), EntryResolver::system()).unwrap();
        assert!(walker.root().is_absolute());
    }

    #[test]
    fn test_skips_directories_and_pattern_mismatches() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("keep.txt"), b"abc").unwrap();
        fs::write(dir.path().join("sub/keep2.txt"), b"abcd").unwrap();
        fs::write(dir.path().join("skip.log"), b"abc").unwrap();

        let walker = TreeWalker::new(dir.path(), Regex::new(r"\.txt$").unwrap(), EntryResolver::system())
            .unwrap()
            .with_workers(3);
        let mut records = collect(&walker);
        records.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(records.len(), 2);
        assert!(records[0].path.ends_with("keep.txt"));
        assert!(records[1].path.ends_with("sub/keep2.txt"));
        assert!(records.iter().all(|r| !r.is_error()));
    }

    #[test]
    fn test_skips_sockets_and_links_to_them() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("control.sock");
        let _listener = UnixListener::bind(&socket).unwrap();
        symlink(&socket, dir.path().join("control.link")).unwrap();

        let walker = TreeWalker::new(dir.path(), Regex::new("").unwrap(), EntryResolver::system())
            .unwrap()
            .with_workers(2);
        let records = collect(&walker);

        assert!(records.is_empty());
        assert_eq!(walker.stats().snapshot().errors, 0);
    }

    #[test]
    fn test_pattern_matches_raw_path_bytes() {
        let dir = tempdir().unwrap();
        let latin1 = dir.path().join(std::ffi::OsStr::from_bytes(b"caf\xe9.dat"));
        fs::write(&latin1, b"x").unwrap();
        fs::write(dir.path().join("cafe.dat"), b"x").unwrap();

        let walker = TreeWalker::new(dir.path(), Regex::new(r"(?-u)\xE9\.dat$").unwrap(), EntryResolver::system())
            .unwrap();
        let records = collect(&walker);

        assert_eq!(records.len(), 1);
        assert!(records[0].path.ends_with("caf\u{FFFD}.dat"));
        assert!(!records[0].is_error());
    }

    #[test]
    fn test_dangling_link_matched_by_pattern_is_reported() {
        let dir = tempdir().unwrap();
        symlink(dir.path().join("missing"), dir.path().join("dangling")).unwrap();

        let walker = TreeWalker::new(dir.path(), Regex::new("").unwrap(), EntryResolver::system()).unwrap();
        let records = collect(&walker);

        assert_eq!(records.len(), 1);
        assert!(records[0].is_error());
        assert!(records[0].target.as_deref().unwrap().ends_with("missing"));
    }

    #[test]
    fn test_many_files_no_lost_records() {
        let dir = tempdir().unwrap();
        for d in 0..10 {
            let sub = dir.path().join(format!("d{}", d));
            fs::create_dir(&sub).unwrap();
            for f in 0..50 {
                fs::write(sub.join(format!("f{}.dat", f)), b"x").unwrap();
            }
        }

        let walker = TreeWalker::new(dir.path(), Regex::new("").unwrap(), EntryResolver::system())
            .unwrap()
            .with_workers(8);

        // Rendezvous channel: every send waits for the consumer
        let (tx, rx) = bounded(0);
        let consumer = std::thread::spawn(move || rx.iter().count());
        walker.run(&tx).unwrap();
        drop(tx);

        assert_eq!(consumer.join().unwrap(), 500);
        let counts = walker.stats().snapshot();
        assert_eq!(counts.dispatched, 500);
        assert_eq!(counts.records, 500);
    }

    #[test]
    fn test_stops_when_consumer_gone() {
        let dir = tempdir().unwrap();
        for f in 0..20 {
            fs::write(dir.path().join(format!("f{}", f)), b"x").unwrap();
        }

        let walker = TreeWalker::new(dir.path(), Regex::new("").unwrap(), EntryResolver::system())
            .unwrap()
            .with_workers(2);
        let (tx, rx) = bounded(0);
        drop(rx);

        // Returns instead of blocking forever
        walker.run(&tx).unwrap();
        let counts = walker.stats().snapshot();
        assert!(counts.dispatched <= 20);
        assert!(counts.records <= counts.dispatched);
    }
}
