//! Record serializer - drains the record stream into the load pipe
//!
//! Runs in its own thread. Each record becomes one row, written through
//! a buffer into the pipe. When the record stream is exhausted the
//! buffer is flushed and the pipe closed; if the run has already failed
//! elsewhere the pipe is aborted instead so the load job does not commit.

use crate::error::SinkError;
use crate::fs::FileRecord;
use crate::sink::pipe::PipeWriter;
use crate::sink::tsv;
use crossbeam_channel::Receiver;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Default write buffer in front of the pipe
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Serializer counters
#[derive(Debug, Default)]
pub struct SerializerStats {
    /// Rows written
    pub rows: AtomicU64,

    /// Bytes handed to the pipe
    pub bytes: AtomicU64,
}

impl SerializerStats {
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Tells the serializer whether the stream it drained is complete
pub trait RunState: Send + Sync {
    /// Reason the run already failed, if it did
    fn failure(&self) -> Option<String>;
}

/// Writes records as rows into a pipe
pub struct RecordSerializer {
    out: BufWriter<PipeWriter>,
    stats: Arc<SerializerStats>,
}

impl RecordSerializer {
    pub fn new(pipe: PipeWriter) -> Self {
        Self::with_buffer(pipe, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer(pipe: PipeWriter, buffer_size: usize) -> Self {
        Self {
            out: BufWriter::with_capacity(buffer_size, pipe),
            stats: Arc::new(SerializerStats::default()),
        }
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<SerializerStats> {
        Arc::clone(&self.stats)
    }

    /// Consume records until the stream closes, then close the pipe
    ///
    /// Returns the number of rows written. On a write failure the pipe is
    /// aborted and consumption stops.
    pub fn run(mut self, records: Receiver<FileRecord>, state: &dyn RunState) -> Result<u64, SinkError> {
        let mut rows = 0u64;
        let mut line: Vec<u8> = Vec::with_capacity(256);

        for record in records.iter() {
            line.clear();
            // Rendering into a Vec cannot fail
            let _ = tsv::write_row(&mut line, &record);

            if let Err(source) = self.out.write_all(&line) {
                debug!(path = %record.path, error = %source, "Row write failed");
                self.abort("serializer write failed");
                return Err(SinkError::Write {
                    path: record.path,
                    source,
                });
            }

            rows += 1;
            self.stats.rows.fetch_add(1, Ordering::Relaxed);
            self.stats.bytes.fetch_add(line.len() as u64, Ordering::Relaxed);
        }

        if let Some(reason) = state.failure() {
            debug!(rows, "Record stream ended after a failure, aborting load stream");
            self.abort(&reason);
            return Ok(rows);
        }

        let pipe = self
            .out
            .into_inner()
            .map_err(|e| SinkError::Close(e.into_error()))?;
        pipe.close().map_err(SinkError::Close)?;

        debug!(rows, "Load stream closed");
        Ok(rows)
    }

    fn abort(self, reason: &str) {
        // Buffered bytes are discarded; the reader only learns the stream failed.
        let (pipe, _buffered) = self.out.into_parts();
        let _ = pipe.abort(reason);
    }
}
