//! Local filesystem side of the pipeline
//!
//! - `types`: entry types, the traversal entry and the emitted record
//! - `identity`: cached uid/gid to name resolution
//! - `resolver`: per-entry symlink resolution and stat

pub mod identity;
pub mod resolver;
pub mod types;

pub use identity::{IdentityCache, IdentityLookup, SystemGroups, SystemUsers};
pub use resolver::EntryResolver;
pub use types::{format_mode, EntryType, FileRecord, Permissions, ScanEntry};
