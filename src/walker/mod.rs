//! Parallel tree walker
//!
//! This module implements the collection side of the pipeline: a single
//! traversal thread that filters entries and a bounded pool of resolver
//! threads that turn them into records.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │       TreeWalker        │
//!                     │  - Traversal (walkdir)  │
//!                     │  - Type/pattern filter  │
//!                     └───────────┬─────────────┘
//!                                 │ dispatch queue
//!       ┌─────────────────────────┼─────────────────────────┐
//!       │                         │                         │
//! ┌─────▼─────┐             ┌─────▼─────┐             ┌─────▼─────┐
//! │Resolver 1 │             │Resolver 2 │             │Resolver N │
//! │ readlink  │             │ readlink  │             │ readlink  │
//! │ stat      │             │ stat      │             │ stat      │
//! └─────┬─────┘             └─────┬─────┘             └─────┬─────┘
//!       └─────────────────────────┼─────────────────────────┘
//!                                 ▼
//!                          record stream
//! ```

pub mod stats;
pub mod tree;
pub mod worker;

pub use stats::{WalkCounts, WalkProgress, WalkStats};
pub use tree::TreeWalker;
pub use worker::ResolverWorker;
