//! Bulk-load jobs
//!
//! A load job reads the row stream from the pipe and replaces the
//! destination with it as one unit. Nothing becomes visible in the
//! destination unless the stream reaches a clean end and the number of
//! rejected rows stays within the configured allowance.
//!
//! Two destinations are provided:
//! - [`SqliteLoader`]: a table in a SQLite database, swapped in a transaction
//! - [`TsvFileLoader`]: a tab-separated file, swapped by rename

pub mod file;
pub mod schema;
pub mod sqlite;

pub use file::TsvFileLoader;
pub use sqlite::SqliteLoader;

use crate::config::{DestinationFormat, WalkConfig};
use crate::error::{LoadError, LoadResult, WalkerError, WorkerError};
use crate::sink::pipe::PipeReader;
use crate::sink::tsv::{RowReader, TableRow};
use std::io::{BufRead, BufReader};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Rejection messages kept in the final status
const MAX_KEPT_REJECTIONS: usize = 10;

/// A row the destination refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based row number in the stream
    pub row: u64,

    /// Why the row was refused
    pub reason: String,
}

/// Outcome of a finished load
#[derive(Debug, Clone, Default)]
pub struct LoadStatus {
    /// Human-readable destination
    pub destination: String,

    /// Rows now in the destination
    pub rows_loaded: u64,

    /// Rows refused
    pub rows_rejected: u64,

    /// The first few refusals
    pub rejections: Vec<RejectedRow>,
}

/// A destination that can replace its contents from a row stream
pub trait BulkLoad: Send + 'static {
    /// Human-readable destination, for logs
    fn destination(&self) -> String;

    /// Consume the stream and replace the destination with it
    ///
    /// Must leave the destination untouched on any error.
    fn load(self: Box<Self>, source: &mut PipeReader) -> LoadResult<LoadStatus>;
}

/// Observes a load result while the job still holds its stream
///
/// The writer side only sees the stream close after `finished` returns,
/// so a watcher learns about a load failure before the writer does.
pub trait LoadWatch: Send + Sync {
    fn finished(&self, result: &LoadResult<LoadStatus>);

    /// The loader panicked; the stream is still held
    fn panicked(&self, error: &WorkerError);
}

/// Open the loader for a configured destination
///
/// Fails before any stream exists if the destination cannot be opened.
pub fn open_destination(config: &WalkConfig) -> LoadResult<Box<dyn BulkLoad>> {
    match config.format {
        DestinationFormat::Sqlite => Ok(Box::new(SqliteLoader::open(
            &config.output,
            &config.table,
            config.max_bad_records,
        )?)),
        DestinationFormat::Tsv => Ok(Box::new(TsvFileLoader::open(
            &config.output,
            config.max_bad_records,
        )?)),
    }
}

/// A load running on its own thread
pub struct LoadJob {
    destination: String,
    handle: JoinHandle<Result<LoadResult<LoadStatus>, WorkerError>>,
}

impl LoadJob {
    /// Start loading from `source`, reporting the result to `watch`
    pub fn start(
        loader: Box<dyn BulkLoad>,
        mut source: PipeReader,
        watch: Arc<dyn LoadWatch>,
    ) -> Result<Self, WorkerError> {
        let destination = loader.destination();
        debug!(destination = %destination, "Starting load job");

        let handle = thread::Builder::new()
            .name("load-job".into())
            .spawn(move || {
                let loaded = panic::catch_unwind(AssertUnwindSafe(|| loader.load(&mut source)));
                let outcome = match loaded {
                    Ok(result) => {
                        watch.finished(&result);
                        Ok(result)
                    }
                    Err(payload) => {
                        let error = WorkerError::from_panic("load-job", payload);
                        watch.panicked(&error);
                        Err(error)
                    }
                };
                // The writer sees the stream close only after the watch knows
                drop(source);
                outcome
            })
            .map_err(|e| WorkerError::SpawnFailed {
                name: "load-job".into(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            destination,
            handle,
        })
    }

    /// Whether the job thread has returned
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the job reports its final status
    pub fn wait(self) -> Result<LoadStatus, WalkerError> {
        let result = self
            .handle
            .join()
            .map_err(|payload| WorkerError::from_panic("load-job", payload))??;

        match result {
            Ok(status) => {
                info!(
                    destination = %status.destination,
                    rows = status.rows_loaded,
                    rejected = status.rows_rejected,
                    "Load committed"
                );
                Ok(status)
            }
            Err(e) => {
                warn!(destination = %self.destination, error = %e, "Load failed");
                Err(e.into())
            }
        }
    }
}

/// Counts refused rows against the allowance
#[derive(Debug)]
pub(crate) struct Rejections {
    allowed: u64,
    count: u64,
    kept: Vec<RejectedRow>,
}

impl Rejections {
    pub(crate) fn new(allowed: u64) -> Self {
        Self {
            allowed,
            count: 0,
            kept: Vec::new(),
        }
    }

    /// Record a refusal, failing once the allowance is exceeded
    pub(crate) fn reject(&mut self, row: u64, reason: String) -> LoadResult<()> {
        debug!(row, reason = %reason, "Row rejected");
        self.count += 1;
        if self.kept.len() < MAX_KEPT_REJECTIONS {
            self.kept.push(RejectedRow { row, reason });
        }

        if self.count > self.allowed {
            let first = self
                .kept
                .first()
                .map(|r| format!("row {}: {}", r.row, r.reason))
                .unwrap_or_default();
            return Err(LoadError::TooManyBadRecords {
                rejected: self.count,
                allowed: self.allowed,
                first,
            });
        }
        Ok(())
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    pub(crate) fn into_kept(self) -> Vec<RejectedRow> {
        self.kept
    }
}

/// Feed every valid row of `source` to `accept`
///
/// Malformed rows go to `rejections`. A stream that ends with an error
/// instead of a clean close fails the whole load.
pub(crate) fn for_each_row<F>(source: &mut PipeReader, rejections: &mut Rejections, mut accept: F) -> LoadResult<u64>
where
    F: FnMut(TableRow) -> LoadResult<()>,
{
    let mut reader = RowReader::new(BufReader::with_capacity(64 * 1024, source));
    read_rows(&mut reader, rejections, &mut accept)
}

fn read_rows<R, F>(reader: &mut RowReader<R>, rejections: &mut Rejections, accept: &mut F) -> LoadResult<u64>
where
    R: BufRead,
    F: FnMut(TableRow) -> LoadResult<()>,
{
    let mut row = 0u64;
    let mut accepted = 0u64;

    loop {
        let fields = match reader.read_row() {
            Ok(Some(fields)) => fields,
            Ok(None) => return Ok(accepted),
            Err(e) => return Err(LoadError::SourceAborted(e.to_string())),
        };
        row += 1;

        match TableRow::from_fields(fields) {
            Ok(parsed) => {
                accept(parsed)?;
                accepted += 1;
            }
            Err(reason) => rejections.reject(row, reason)?,
        }
    }
}
