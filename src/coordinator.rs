//! Load coordinator - runs the walk, the serializer and the load job together
//!
//! The coordinator is responsible for:
//! - Resolving the root and opening the destination before anything starts
//! - Wiring the record stream and the load pipe between the three legs
//! - Collecting the first failure of any leg
//! - Progress reporting and final statistics
//!
//! ```text
//! walk thread ──records──► serializer thread ──bytes──► load job thread
//!      │                          │                          │
//!      └──────────── first failure (Outcome) ◄───────────────┘
//! ```
//!
//! The serializer closes the pipe only when the record stream ended and no
//! leg has failed. Otherwise it aborts the pipe, so the load job never
//! replaces the destination with a partial row set.

use crate::config::WalkConfig;
use crate::error::{LoadResult, Result, WalkerError, WorkerError};
use crate::fs::{EntryResolver, FileRecord};
use crate::load::{self, BulkLoad, LoadJob, LoadStatus, LoadWatch};
use crate::sink::pipe::pipe;
use crate::sink::serializer::{RecordSerializer, RunState, SerializerStats};
use crate::walker::{TreeWalker, WalkCounts, WalkProgress, WalkStats};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// How often progress callbacks fire
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Pipeline leg that reported a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Walk,
    Serialize,
    Load,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Walk => write!(f, "walk"),
            Stage::Serialize => write!(f, "serialize"),
            Stage::Load => write!(f, "load"),
        }
    }
}

struct Failure {
    stage: Stage,
    message: String,
    /// Owned error, absent when the load job keeps it until `wait`
    error: Option<WalkerError>,
}

/// First-failure slot shared by the three legs
#[derive(Default)]
struct Outcome {
    failed: AtomicBool,
    first: Mutex<Option<Failure>>,
}

impl Outcome {
    fn fail(&self, stage: Stage, error: WalkerError) {
        self.record(stage, error.to_string(), Some(error));
    }

    fn record(&self, stage: Stage, message: String, error: Option<WalkerError>) {
        let mut first = self.first.lock();
        if first.is_some() {
            debug!(stage = %stage, error = %message, "Later failure ignored");
            return;
        }
        error!(stage = %stage, error = %message, "Run failed");
        *first = Some(Failure {
            stage,
            message,
            error,
        });
        self.failed.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> Option<Failure> {
        self.first.lock().take()
    }
}

impl RunState for Outcome {
    fn failure(&self) -> Option<String> {
        if !self.failed.load(Ordering::SeqCst) {
            return None;
        }
        self.first.lock().as_ref().map(|f| f.message.clone())
    }
}

impl LoadWatch for Outcome {
    fn finished(&self, result: &LoadResult<LoadStatus>) {
        if let Err(e) = result {
            self.record(Stage::Load, e.to_string(), None);
        }
    }

    fn panicked(&self, error: &WorkerError) {
        self.record(Stage::Load, error.to_string(), None);
    }
}

/// Records a walk-thread panic before the record stream closes
struct PanicGuard<'a> {
    outcome: &'a Outcome,
    stage: Stage,
    name: &'static str,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.outcome.fail(
                self.stage,
                WorkerError::Panicked {
                    name: self.name.to_string(),
                    message: "panicked while streaming records".to_string(),
                }
                .into(),
            );
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Absolute root that was walked
    pub root: PathBuf,

    /// Final walk counters
    pub counts: WalkCounts,

    /// Rows serialized into the load stream
    pub rows_streamed: u64,

    /// Bytes serialized into the load stream
    pub bytes_streamed: u64,

    /// What the destination accepted
    pub load: LoadStatus,

    /// Wall time of the run
    pub duration: Duration,
}

/// Runs one walk-and-load
pub struct LoadCoordinator {
    walker: TreeWalker,
    loader: Box<dyn BulkLoad>,
    channel_capacity: usize,
    pipe_capacity: usize,
}

impl LoadCoordinator {
    /// Resolve the root and open the destination
    ///
    /// Both failures are reported here, before any thread is started.
    pub fn new(config: &WalkConfig) -> Result<Self> {
        let walker = TreeWalker::new(&config.root, config.pattern.clone(), EntryResolver::system())?
            .with_workers(config.worker_count);
        let loader = load::open_destination(config)?;

        Ok(Self::from_parts(walker, loader)
            .with_channel_capacity(config.channel_capacity)
            .with_pipe_capacity(config.pipe_capacity))
    }

    /// Assemble a coordinator from a prepared walker and loader
    pub fn from_parts(walker: TreeWalker, loader: Box<dyn BulkLoad>) -> Self {
        Self {
            walker,
            loader,
            channel_capacity: 0,
            pipe_capacity: crate::config::DEFAULT_PIPE_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self
    }

    /// Run to completion
    pub fn run(self) -> Result<RunSummary> {
        self.run_with_progress(|_| {})
    }

    /// Run to completion, calling `on_progress` periodically
    pub fn run_with_progress<F>(self, on_progress: F) -> Result<RunSummary>
    where
        F: Fn(&WalkProgress),
    {
        let start = Instant::now();
        let LoadCoordinator {
            walker,
            loader,
            channel_capacity,
            pipe_capacity,
        } = self;

        let root = walker.root().to_path_buf();
        let walk_stats: Arc<WalkStats> = walker.stats();
        let outcome = Arc::new(Outcome::default());

        info!(
            root = %root.display(),
            pattern = %walker.pattern(),
            workers = walker.worker_count(),
            destination = %loader.destination(),
            "Starting walk and load"
        );

        let (pipe_writer, pipe_reader) = pipe(pipe_capacity);
        let (record_tx, record_rx) = bounded::<FileRecord>(channel_capacity);
        let total_workers = walker.worker_count();

        // Producer first: a leg that fails to spawn drops its end of the
        // stream and the legs already running wind down.
        let walk_outcome = Arc::clone(&outcome);
        let walk_handle = spawn_named("walker", move || {
            let record_tx = record_tx;
            let _guard = PanicGuard {
                outcome: walk_outcome.as_ref(),
                stage: Stage::Walk,
                name: "walker",
            };
            if let Err(e) = walker.run(&record_tx) {
                walk_outcome.fail(Stage::Walk, e);
            }
            // The stream closes only after any failure is recorded
            drop(record_tx);
        })?;

        let serializer = RecordSerializer::new(pipe_writer);
        let sink_stats: Arc<SerializerStats> = serializer.stats();
        let serialize_outcome = Arc::clone(&outcome);
        let serialize_handle = match spawn_named("serializer", move || {
            if let Err(e) = serializer.run(record_rx, serialize_outcome.as_ref()) {
                serialize_outcome.fail(Stage::Serialize, e.into());
            }
        }) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = join_named("walker", walk_handle);
                return Err(e.into());
            }
        };

        let watch: Arc<dyn LoadWatch> = Arc::clone(&outcome) as Arc<dyn LoadWatch>;
        let job = match LoadJob::start(loader, pipe_reader, watch) {
            Ok(job) => job,
            Err(e) => {
                let _ = join_named("serializer", serialize_handle);
                let _ = join_named("walker", walk_handle);
                return Err(e.into());
            }
        };

        loop {
            on_progress(&WalkProgress {
                counts: walk_stats.snapshot(),
                rows_written: sink_stats.rows(),
                bytes_streamed: sink_stats.bytes(),
                total_workers,
                elapsed: start.elapsed(),
            });
            if job.is_finished() {
                break;
            }
            thread::sleep(PROGRESS_INTERVAL);
        }

        let load_result = job.wait();
        let walk_join = join_named("walker", walk_handle);
        let serialize_join = join_named("serializer", serialize_handle);

        // A panic is always the root cause, whatever else was recorded
        walk_join?;
        serialize_join?;
        let load_result = match load_result {
            Err(WalkerError::Worker(panic @ WorkerError::Panicked { .. })) => return Err(panic.into()),
            other => other,
        };

        match outcome.take() {
            Some(Failure {
                error: Some(error), ..
            }) => return Err(error),
            Some(Failure { stage, message, .. }) => {
                debug!(stage = %stage, error = %message, "Reporting load failure");
            }
            None => {}
        }
        let status = load_result?;

        let summary = RunSummary {
            root,
            counts: walk_stats.snapshot(),
            rows_streamed: sink_stats.rows(),
            bytes_streamed: sink_stats.bytes(),
            load: status,
            duration: start.elapsed(),
        };

        info!(
            records = summary.counts.records,
            rows_loaded = summary.load.rows_loaded,
            rejected = summary.load.rows_rejected,
            duration_ms = summary.duration.as_millis() as u64,
            "Walk and load completed"
        );

        Ok(summary)
    }
}

fn spawn_named<F>(name: &'static str, f: F) -> std::result::Result<JoinHandle<()>, WorkerError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map_err(|e| WorkerError::SpawnFailed {
            name: name.into(),
            reason: e.to_string(),
        })
}

fn join_named(name: &str, handle: JoinHandle<()>) -> std::result::Result<(), WorkerError> {
    handle
        .join()
        .map_err(|payload| WorkerError::from_panic(name, payload))
}
