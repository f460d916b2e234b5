//! Tab-separated file destination
//!
//! Rows are validated and written to a temporary file next to the
//! destination, which is renamed over the destination once the stream
//! closes cleanly. A failed load removes the temporary file.

use crate::error::{LoadError, LoadResult};
use crate::load::{for_each_row, BulkLoad, LoadStatus, Rejections};
use crate::sink::pipe::PipeReader;
use crate::sink::tsv::write_fields;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Loads the row stream into a single file
pub struct TsvFileLoader {
    path: PathBuf,
    staging: NamedTempFile,
    max_bad_records: u64,
}

impl TsvFileLoader {
    /// Prepare a staging file beside `path`
    pub fn open(path: &Path, max_bad_records: u64) -> LoadResult<Self> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let staging = NamedTempFile::new_in(dir).map_err(|e| LoadError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!(path = %path.display(), "Opened file destination");

        Ok(Self {
            path: path.to_path_buf(),
            staging,
            max_bad_records,
        })
    }
}

impl BulkLoad for TsvFileLoader {
    fn destination(&self) -> String {
        self.path.display().to_string()
    }

    fn load(self: Box<Self>, source: &mut PipeReader) -> LoadResult<LoadStatus> {
        let destination = self.destination();
        let TsvFileLoader {
            path,
            staging,
            max_bad_records,
        } = *self;

        let mut out = BufWriter::with_capacity(64 * 1024, staging);
        let mut rejections = Rejections::new(max_bad_records);

        let rows_loaded = for_each_row(source, &mut rejections, |row| {
            write_fields(&mut out, &row.fields())?;
            Ok(())
        })?;

        out.flush()?;
        let staging = out.into_inner().map_err(|e| LoadError::Io(e.into_error()))?;
        staging.as_file().sync_all()?;
        debug!(rows = rows_loaded, staging = %staging.path().display(), "Staging file written");

        staging.persist(&path).map_err(|e| LoadError::ReplaceFailed {
            path: path.clone(),
            reason: e.error.to_string(),
        })?;

        Ok(LoadStatus {
            destination,
            rows_loaded,
            rows_rejected: rejections.count(),
            rejections: rejections.into_kept(),
        })
    }
}
