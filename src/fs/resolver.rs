//! Entry resolver: one traversal entry in, at most one record out
//!
//! Resolution order:
//! 1. Symlinks are resolved to their final target. On failure the raw
//!    link text is kept as the target and the failure is remembered.
//! 2. The resolved target is stat'ed. If that (or step 1) failed, the
//!    entry itself is lstat'ed instead; if even that fails a failure
//!    record with only the raw entry type is produced.
//! 3. Targets that are not regular files (or links, on the lstat path)
//!    produce nothing.
//! 4. Otherwise mode, size, mtime and owner/group names are filled in.

use crate::fs::identity::IdentityCache;
use crate::fs::types::{EntryType, FileRecord, ScanEntry};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs::{self, Metadata};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Resolves scan entries into file records
#[derive(Debug)]
pub struct EntryResolver {
    users: IdentityCache,
    groups: IdentityCache,
}

impl EntryResolver {
    pub fn new(users: IdentityCache, groups: IdentityCache) -> Self {
        Self { users, groups }
    }

    /// Resolver backed by the system user and group databases
    pub fn system() -> Self {
        Self::new(IdentityCache::users(), IdentityCache::groups())
    }

    /// Resolve one entry
    ///
    /// Returns `None` when the entry (after following links) is not a
    /// regular file; such entries are not recorded.
    pub fn resolve(&self, entry: &ScanEntry) -> Option<FileRecord> {
        let path = entry.path.as_path();
        let mut failure: Option<io::Error> = None;
        let mut target: Option<PathBuf> = None;

        if entry.entry_type.is_symlink() {
            match fs::canonicalize(path) {
                Ok(resolved) => target = Some(resolved),
                Err(e) => {
                    target = fs::read_link(path).ok();
                    failure = Some(e);
                }
            }
        }

        let stat = match failure.take() {
            None => fs::metadata(target.as_deref().unwrap_or(path)),
            Some(e) => Err(e),
        };

        let meta = match stat {
            Ok(meta) => meta,
            Err(e) => match fs::symlink_metadata(path) {
                Ok(meta) => {
                    failure = Some(e);
                    meta
                }
                Err(_) => {
                    debug!(path = %path.display(), error = %e, "Entry unresolvable");
                    return Some(FileRecord {
                        path: path_string(path),
                        mode: Some(entry.entry_type.mode_bits()),
                        target: target.as_deref().map(path_string),
                        error: Some(e.to_string()),
                        ..Default::default()
                    });
                }
            },
        };

        let resolved_type = EntryType::from_mode(meta.mode());
        if !resolved_type.is_recordable() {
            return None;
        }

        let error = failure.map(|e| {
            debug!(path = %path.display(), error = %e, "Entry resolved with error");
            e.to_string()
        });

        Some(FileRecord {
            path: path_string(path),
            mode: Some(meta.mode()),
            owner: self.users.resolve(meta.uid()),
            group: self.groups.resolve(meta.gid()),
            size: Some(meta.len()),
            modified: modified_civil(&meta),
            target: target.as_deref().map(path_string),
            error,
        })
    }
}

/// Path as column text; invalid UTF-8 bytes become U+FFFD
pub(crate) fn path_string(path: &Path) -> String {
    match path.to_str() {
        Some(text) => text.to_owned(),
        None => {
            debug!(path = %path.display(), "Path is not valid UTF-8, invalid bytes replaced");
            path.to_string_lossy().into_owned()
        }
    }
}

/// Modification time as a UTC civil timestamp
fn modified_civil(meta: &Metadata) -> Option<NaiveDateTime> {
    meta.modified().ok().map(to_civil)
}

pub(crate) fn to_civil(time: SystemTime) -> NaiveDateTime {
    DateTime::<Utc>::from(time).naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::identity::IdentityLookup;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    struct FixedNames;

    impl IdentityLookup for FixedNames {
        fn lookup(&self, id: u32) -> Option<String> {
            Some(format!("id{}", id))
        }
    }

    fn resolver() -> EntryResolver {
        EntryResolver::new(IdentityCache::new(FixedNames), IdentityCache::new(FixedNames))
    }

    #[test]
    fn test_regular_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f1.txt");
        fs::write(&file, b"0123456789").unwrap();

        let rec = resolver()
            .resolve(&ScanEntry::new(&file, EntryType::File))
            .unwrap();

        assert_eq!(rec.path, file.to_string_lossy());
        assert_eq!(rec.size, Some(10));
        assert_eq!(EntryType::from_mode(rec.mode.unwrap()), EntryType::File);
        assert!(rec.modified.is_some());
        assert!(rec.owner.as_deref().unwrap().starts_with("id"));
        assert!(rec.group.is_some());
        assert_eq!(rec.target, None);
        assert_eq!(rec.error, None);
    }

    #[test]
    fn test_symlink_to_file_reports_target() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f1.txt");
        let link = dir.path().join("f2.txt");
        fs::write(&file, b"0123456789").unwrap();
        symlink(&file, &link).unwrap();

        let rec = resolver()
            .resolve(&ScanEntry::new(&link, EntryType::Symlink))
            .unwrap();

        let expected = fs::canonicalize(&file).unwrap();
        assert_eq!(rec.target.as_deref(), Some(&*expected.to_string_lossy()));
        assert_eq!(rec.size, Some(10));
        assert_eq!(EntryType::from_mode(rec.mode.unwrap()), EntryType::File);
        assert_eq!(rec.error, None);
    }

    #[test]
    fn test_dangling_symlink_is_failure_record() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("dangling");
        let missing = dir.path().join("missing");
        symlink(&missing, &link).unwrap();

        let rec = resolver()
            .resolve(&ScanEntry::new(&link, EntryType::Symlink))
            .unwrap();

        assert!(rec.is_error());
        assert_eq!(rec.path, link.to_string_lossy());
        assert_eq!(rec.target.as_deref(), Some(&*missing.to_string_lossy()));
        // Partial data comes from the link itself
        assert_eq!(EntryType::from_mode(rec.mode.unwrap()), EntryType::Symlink);
        assert!(rec.size.is_some());
    }

    #[test]
    fn test_symlink_cycle_does_not_hang() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        symlink(&b, &a).unwrap();
        symlink(&a, &b).unwrap();

        let rec = resolver()
            .resolve(&ScanEntry::new(&a, EntryType::Symlink))
            .unwrap();
        assert!(rec.is_error());
    }

    #[test]
    fn test_symlink_to_directory_is_dropped() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        let link = dir.path().join("to_sub");
        fs::create_dir(&sub).unwrap();
        symlink(&sub, &link).unwrap();

        assert!(resolver()
            .resolve(&ScanEntry::new(&link, EntryType::Symlink))
            .is_none());
    }

    #[test]
    fn test_vanished_entry_keeps_raw_type() {
        let dir = tempdir().unwrap();
        let gone = dir.path().join("gone.txt");

        let rec = resolver()
            .resolve(&ScanEntry::new(&gone, EntryType::File))
            .unwrap();

        assert!(rec.is_error());
        assert_eq!(rec.mode, Some(EntryType::File.mode_bits()));
        assert_eq!(rec.size, None);
        assert_eq!(rec.owner, None);
        assert_eq!(rec.modified, None);
    }

    #[test]
    fn test_to_civil_epoch() {
        let civil = to_civil(SystemTime::UNIX_EPOCH);
        assert_eq!(civil.to_string(), "1970-01-01 00:00:00");
    }
}
