//! Error types for tree-loader
//!
//! This module defines the error hierarchy for the collection pipeline:
//! - Configuration and CLI errors
//! - Walk errors (root resolution)
//! - Sink errors (serialization into the byte pipe)
//! - Load errors (the bulk-load job)
//! - Worker thread errors
//!
//! Per-entry and per-directory failures are not errors at this level.
//! They are recorded as the `Error` column of a row and never abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a run
#[derive(Error, Debug)]
pub enum WalkerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tree walk errors
    #[error("Walk error: {0}")]
    Walk(#[from] WalkError),

    /// Serialization into the load stream failed
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Bulk-load job errors
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid pipe capacity
    #[error("Invalid pipe capacity {size}: must be at least {min}")]
    InvalidPipeCapacity { size: usize, min: usize },

    /// Inclusion pattern does not compile
    #[error("Invalid inclusion pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Destination table name is not a plain identifier
    #[error("Invalid table name '{table}': expected letters, digits and underscores")]
    InvalidTable { table: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Errors that stop the tree walk as a whole
#[derive(Error, Debug)]
pub enum WalkError {
    /// The root could not be resolved or does not exist
    #[error("Cannot walk '{path}': {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while serializing records into the load stream
#[derive(Error, Debug)]
pub enum SinkError {
    /// Writing a row failed (typically the reading side went away)
    #[error("Failed to write row for '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Flushing or closing the stream failed
    #[error("Failed to close load stream: {0}")]
    Close(#[source] std::io::Error),
}

/// Bulk-load job errors (job-level, distinct from per-row rejections)
#[derive(Error, Debug)]
pub enum LoadError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to open or create the destination
    #[error("Failed to open destination '{path}': {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// The source stream ended with an error instead of a clean close
    #[error("Load stream aborted: {0}")]
    SourceAborted(String),

    /// Too many rows were rejected
    #[error("Too many bad records: {rejected} rejected, {allowed} allowed (first: {first})")]
    TooManyBadRecords {
        rejected: u64,
        allowed: u64,
        first: String,
    },

    /// Moving the finished output into place failed
    #[error("Failed to replace '{path}': {reason}")]
    ReplaceFailed { path: PathBuf, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// A pipeline thread panicked
    #[error("Thread '{name}' panicked: {message}")]
    Panicked { name: String, message: String },

    /// Thread could not be spawned
    #[error("Failed to spawn thread '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },
}

impl WorkerError {
    /// Build a `Panicked` error from a join payload
    pub fn from_panic(name: &str, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        WorkerError::Panicked {
            name: name.to_string(),
            message,
        }
    }
}

/// Result type alias for WalkerError
pub type Result<T> = std::result::Result<T, WalkerError>;

/// Result type alias for LoadError
pub type LoadResult<T> = std::result::Result<T, LoadError>;
