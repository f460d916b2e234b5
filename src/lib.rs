//! tree-loader - Directory Tree Metadata Loader
//!
//! Walks a directory tree, resolves every regular file (following
//! symlinks) into a metadata row and replaces a destination table with the
//! full row set in one step.
//!
//! # Features
//!
//! - **Parallel Resolution**: A bounded pool of resolver threads stats
//!   entries while a single thread traverses the tree.
//!
//! - **Streaming**: Records flow through an unbuffered handoff into a
//!   bounded byte pipe, so memory stays flat on very large trees.
//!
//! - **All-or-nothing Load**: The destination is replaced only when the
//!   walk, the serializer and the load all succeed.
//!
//! - **Errors as Data**: Unreadable entries and directories become rows
//!   with an `Error` column instead of stopping the run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Walk thread                              │
//! │   traversal (walkdir) ──► dispatch queue ──► resolver pool      │
//! │                                              (stat, readlink,   │
//! │                                               owner lookup)     │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ record stream (rendezvous)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Serializer thread                          │
//! │         tab-separated rows ──► bounded byte pipe                │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ close / abort
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Load job thread                           │
//! │   staging table ──► validate rows ──► swap into destination     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Load every file under /srv/data into files.db
//! tree-loader /srv/data -o files.db
//!
//! # Only log files, into their own table
//! tree-loader /srv/data -r '\.log$' -t logs -p
//!
//! # Query results
//! sqlite3 files.db 'SELECT Path, Size FROM files WHERE Size > 1000000000'
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fs;
pub mod load;
pub mod progress;
pub mod sink;
pub mod walker;

pub use config::{CliArgs, DestinationFormat, WalkConfig};
pub use coordinator::{LoadCoordinator, RunSummary};
pub use error::{Result, WalkerError};
pub use fs::FileRecord;
pub use walker::TreeWalker;
