//! Filesystem entry types and the record streamed to the destination
//!
//! `ScanEntry` is what traversal hands to the resolver, `FileRecord` is
//! what the resolver hands to the serializer. Records are never mutated
//! after emission.

use chrono::NaiveDateTime;
use std::fs::FileType;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;

/// Mask for the file type bits of `st_mode`
const S_IFMT: u32 = 0o170000;

/// Type of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    /// Regular file
    File = 0,
    /// Directory
    Directory = 1,
    /// Symbolic link
    Symlink = 2,
    /// Block device
    BlockDevice = 3,
    /// Character device
    CharDevice = 4,
    /// Named pipe (FIFO)
    Fifo = 5,
    /// Unix socket
    Socket = 6,
    /// Unknown type
    Unknown = 255,
}

impl EntryType {
    /// Convert from the type bits of a Unix mode
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            0o100000 => EntryType::File,        // S_IFREG
            0o040000 => EntryType::Directory,   // S_IFDIR
            0o120000 => EntryType::Symlink,     // S_IFLNK
            0o060000 => EntryType::BlockDevice, // S_IFBLK
            0o020000 => EntryType::CharDevice,  // S_IFCHR
            0o010000 => EntryType::Fifo,        // S_IFIFO
            0o140000 => EntryType::Socket,      // S_IFSOCK
            _ => EntryType::Unknown,
        }
    }

    /// Convert from a (non-following) std file type
    pub fn from_file_type(ft: FileType) -> Self {
        if ft.is_file() {
            EntryType::File
        } else if ft.is_dir() {
            EntryType::Directory
        } else if ft.is_symlink() {
            EntryType::Symlink
        } else if ft.is_block_device() {
            EntryType::BlockDevice
        } else if ft.is_char_device() {
            EntryType::CharDevice
        } else if ft.is_fifo() {
            EntryType::Fifo
        } else if ft.is_socket() {
            EntryType::Socket
        } else {
            EntryType::Unknown
        }
    }

    /// The `S_IFMT` bits for this type (0 if unknown)
    pub fn mode_bits(&self) -> u32 {
        match self {
            EntryType::File => 0o100000,
            EntryType::Directory => 0o040000,
            EntryType::Symlink => 0o120000,
            EntryType::BlockDevice => 0o060000,
            EntryType::CharDevice => 0o020000,
            EntryType::Fifo => 0o010000,
            EntryType::Socket => 0o140000,
            EntryType::Unknown => 0,
        }
    }

    /// Leading character of an `ls -l` mode string
    pub fn mode_char(&self) -> char {
        match self {
            EntryType::File => '-',
            EntryType::Directory => 'd',
            EntryType::Symlink => 'l',
            EntryType::BlockDevice => 'b',
            EntryType::CharDevice => 'c',
            EntryType::Fifo => 'p',
            EntryType::Socket => 's',
            EntryType::Unknown => '?',
        }
    }

    /// Check if this is a regular file
    pub fn is_file(&self) -> bool {
        *self == EntryType::File
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        *self == EntryType::Directory
    }

    /// Check if this is a symbolic link
    pub fn is_symlink(&self) -> bool {
        *self == EntryType::Symlink
    }

    /// Entries the pipeline records: regular files and symlinks
    pub fn is_recordable(&self) -> bool {
        self.is_file() || self.is_symlink()
    }
}

/// File permissions (Unix mode bits without type)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions(pub u32);

impl Permissions {
    /// Create from full mode (strips type bits)
    pub fn from_mode(mode: u32) -> Self {
        Self(mode & 0o7777)
    }

    /// Render the nine `rwx` columns, folding in setuid/setgid/sticky
    pub fn to_rwx(&self) -> String {
        let m = self.0;
        let special = |exec: bool, set: bool, lower: char, upper: char| match (exec, set) {
            (true, true) => lower,
            (false, true) => upper,
            (true, false) => 'x',
            (false, false) => '-',
        };
        let bit = |mask: u32, c: char| if m & mask != 0 { c } else { '-' };

        [
            bit(0o400, 'r'),
            bit(0o200, 'w'),
            special(m & 0o100 != 0, m & 0o4000 != 0, 's', 'S'),
            bit(0o040, 'r'),
            bit(0o020, 'w'),
            special(m & 0o010 != 0, m & 0o2000 != 0, 's', 'S'),
            bit(0o004, 'r'),
            bit(0o002, 'w'),
            special(m & 0o001 != 0, m & 0o1000 != 0, 't', 'T'),
        ]
        .iter()
        .collect()
    }
}

/// Render a full Unix mode the way `ls -l` does, e.g. `-rw-r--r--`
///
/// A mode carrying only type bits (no permissions known) renders its
/// permission columns as `-`.
pub fn format_mode(mode: u32) -> String {
    let mut out = String::with_capacity(10);
    out.push(EntryType::from_mode(mode).mode_char());
    out.push_str(&Permissions::from_mode(mode).to_rwx());
    out
}

/// A directory entry as produced by traversal
#[derive(Debug, Clone)]
pub struct ScanEntry {
    /// Absolute path of the entry
    pub path: PathBuf,

    /// Raw type reported by traversal (does not follow symlinks)
    pub entry_type: EntryType,
}

impl ScanEntry {
    pub fn new(path: impl Into<PathBuf>, entry_type: EntryType) -> Self {
        Self {
            path: path.into(),
            entry_type,
        }
    }
}

/// Metadata for one matched entry, success or failure
///
/// `path` is always present. Every other field is populated
/// independently on a best-effort basis; when `error` is set the other
/// fields describe whatever could still be read (typically the link
/// itself rather than its target).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path
    pub path: String,

    /// Full Unix mode (type + permission bits)
    pub mode: Option<u32>,

    /// Resolved owner name
    pub owner: Option<String>,

    /// Resolved group name
    pub group: Option<String>,

    /// Size in bytes of the resolved target
    pub size: Option<u64>,

    /// Last modification, UTC civil time
    pub modified: Option<NaiveDateTime>,

    /// Symlink destination (resolved, or raw if resolution failed)
    pub target: Option<String>,

    /// Failure description for this entry
    pub error: Option<String>,
}

impl FileRecord {
    /// A record carrying only a path and an error (traversal failures)
    pub fn failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Check if this record describes a failure
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Textual mode, if known
    pub fn mode_string(&self) -> Option<String> {
        self.mode.map(format_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_from_mode() {
        assert_eq!(EntryType::from_mode(0o100644), EntryType::File);
        assert_eq!(EntryType::from_mode(0o040755), EntryType::Directory);
        assert_eq!(EntryType::from_mode(0o120777), EntryType::Symlink);
        assert_eq!(EntryType::from_mode(0o020620), EntryType::CharDevice);
        assert_eq!(EntryType::from_mode(0o644), EntryType::Unknown);
    }

    #[test]
    fn test_recordable_types() {
        assert!(EntryType::File.is_recordable());
        assert!(EntryType::Symlink.is_recordable());
        assert!(!EntryType::Directory.is_recordable());
        assert!(!EntryType::Socket.is_recordable());
        assert!(!EntryType::BlockDevice.is_recordable());
    }

    #[test]
    fn test_format_mode() {
        assert_eq!(format_mode(0o100644), "-rw-r--r--");
        assert_eq!(format_mode(0o040755), "drwxr-xr-x");
        assert_eq!(format_mode(0o120777), "lrwxrwxrwx");
        assert_eq!(format_mode(0o104755), "-rwsr-xr-x");
        assert_eq!(format_mode(0o102644), "-rw-r-Sr--");
        assert_eq!(format_mode(0o041777), "drwxrwxrwt");
    }

    #[test]
    fn test_format_type_only_mode() {
        assert_eq!(format_mode(EntryType::Symlink.mode_bits()), "l---------");
        assert_eq!(format_mode(EntryType::File.mode_bits()), "----------");
    }

    #[test]
    fn test_failed_record() {
        let rec = FileRecord::failed("/data/locked", "Permission denied (os error 13)");
        assert!(rec.is_error());
        assert_eq!(rec.path, "/data/locked");
        assert_eq!(rec.mode, None);
        assert_eq!(rec.size, None);
        assert_eq!(rec.mode_string(), None);
    }
}
