//! Configuration types for tree-loader
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Destination selection from the output path

use crate::error::ConfigError;
use crate::load::schema::is_valid_identifier;
use clap::Parser;
use regex::bytes::Regex;
use std::path::{Path, PathBuf};

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Minimum pipe capacity (in-flight chunks)
const MIN_PIPE_CAPACITY: usize = 1;

/// Default pipe capacity
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

/// Default table name for SQLite destinations
pub const DEFAULT_TABLE: &str = "files";

/// Collect file metadata under a directory tree and load it into a table
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tree-loader",
    version,
    about = "Collect file metadata under a directory tree and load it into a table",
    long_about = "Walks a directory tree, resolves each regular file (following symlinks) \
                  and streams one row per file into a destination table, replacing its \
                  contents in one step.\n\n\
                  Output ending in .tsv or .tab is written as a tab-separated file; \
                  anything else is a SQLite database.",
    after_help = "EXAMPLES:\n    \
        tree-loader /srv/data -o files.db\n    \
        tree-loader /srv/data -r '\\.log$' -o logs.db -t logs -p\n    \
        tree-loader /home -o home.tsv --max-bad-records 10"
)]
pub struct CliArgs {
    /// Directory tree to walk
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Only record entries whose absolute path matches this pattern
    #[arg(short = 'r', long, default_value = "", value_name = "PATTERN")]
    pub regex: String,

    /// Output destination (.db for SQLite, .tsv/.tab for a flat file)
    #[arg(short, long, default_value = "files.db", value_name = "FILE")]
    pub output: PathBuf,

    /// Destination table name (SQLite only)
    #[arg(short = 't', long, default_value = DEFAULT_TABLE, value_name = "NAME")]
    pub table: String,

    /// Rows the destination may reject before the load fails
    #[arg(long, default_value = "0", value_name = "NUM")]
    pub max_bad_records: u64,

    /// Number of resolver threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Record channel capacity (0 = unbuffered handoff)
    #[arg(long, default_value = "0", value_name = "NUM")]
    pub channel_capacity: usize,

    /// Load pipe capacity in chunks
    #[arg(long, default_value_t = DEFAULT_PIPE_CAPACITY, value_name = "NUM")]
    pub pipe_capacity: usize,

    /// Show a progress indicator
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    // Resolution is syscall bound, so oversubscribe the cores
    num_cpus::get() * 2
}

/// Destination format chosen from the output path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationFormat {
    /// Table in a SQLite database
    Sqlite,
    /// Tab-separated file
    Tsv,
}

impl DestinationFormat {
    /// Pick a format from the output file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("tab") => {
                DestinationFormat::Tsv
            }
            _ => DestinationFormat::Sqlite,
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Root of the walk, as given
    pub root: PathBuf,

    /// Compiled inclusion pattern (empty matches everything)
    pub pattern: Regex,

    /// Output destination path
    pub output: PathBuf,

    /// Destination format
    pub format: DestinationFormat,

    /// Destination table name
    pub table: String,

    /// Rejections tolerated before the load fails
    pub max_bad_records: u64,

    /// Number of resolver threads
    pub worker_count: usize,

    /// Record channel capacity
    pub channel_capacity: usize,

    /// Load pipe capacity
    pub pipe_capacity: usize,

    /// Show progress indicator
    pub show_progress: bool,
}

impl WalkConfig {
    /// Defaults for walking `root` into `output`
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        let output = output.into();
        Self {
            root: root.into(),
            pattern: Regex::new("").expect("empty pattern always compiles"),
            format: DestinationFormat::from_path(&output),
            output,
            table: DEFAULT_TABLE.to_string(),
            max_bad_records: 0,
            worker_count: default_workers().min(MAX_WORKERS),
            channel_capacity: 0,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            show_progress: false,
        }
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        // Validate worker count
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        // Validate pipe capacity
        if args.pipe_capacity < MIN_PIPE_CAPACITY {
            return Err(ConfigError::InvalidPipeCapacity {
                size: args.pipe_capacity,
                min: MIN_PIPE_CAPACITY,
            });
        }

        let pattern = Regex::new(&args.regex).map_err(|e| ConfigError::InvalidPattern {
            pattern: args.regex.clone(),
            reason: e.to_string(),
        })?;

        let format = DestinationFormat::from_path(&args.output);
        if format == DestinationFormat::Sqlite && !is_valid_identifier(&args.table) {
            return Err(ConfigError::InvalidTable { table: args.table });
        }

        // Validate output path
        if let Some(parent) = args.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidOutputPath {
                    path: args.output.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }
        if args.output.is_dir() {
            return Err(ConfigError::InvalidOutputPath {
                path: args.output.clone(),
                reason: "is a directory".to_string(),
            });
        }

        Ok(Self {
            root: args.root,
            pattern,
            output: args.output,
            format,
            table: args.table,
            max_bad_records: args.max_bad_records,
            worker_count: args.workers,
            channel_capacity: args.channel_capacity,
            pipe_capacity: args.pipe_capacity,
            show_progress: args.progress,
        })
    }
}
