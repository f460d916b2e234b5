//! SQLite destination
//!
//! Rows are inserted into a staging table inside a single transaction.
//! At a clean end of stream the existing destination table is dropped and
//! the staging table renamed over it, then the transaction commits. Any
//! failure rolls the transaction back and leaves the previous table as it
//! was.

use crate::error::{LoadError, LoadResult};
use crate::load::schema::{self, keys, STAGING_SUFFIX};
use crate::load::{for_each_row, BulkLoad, LoadStatus, Rejections};
use crate::sink::pipe::PipeReader;
use crate::sink::tsv::MODIFIED_FORMAT;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads the row stream into one SQLite table
pub struct SqliteLoader {
    conn: Connection,
    path: PathBuf,
    table: String,
    max_bad_records: u64,
}

impl SqliteLoader {
    /// Open (or create) the database holding `table`
    pub fn open(path: &Path, table: &str, max_bad_records: u64) -> LoadResult<Self> {
        if !schema::is_valid_identifier(table) {
            return Err(LoadError::OpenFailed {
                path: path.to_path_buf(),
                reason: format!("invalid table name '{}'", table),
            });
        }

        let conn = Connection::open(path).map_err(|e| LoadError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        schema::prepare_database(&conn).map_err(|e| LoadError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!(path = %path.display(), table = %table, "Opened SQLite destination");

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            table: table.to_string(),
            max_bad_records,
        })
    }
}

impl BulkLoad for SqliteLoader {
    fn destination(&self) -> String {
        format!("{}:{}", self.path.display(), self.table)
    }

    fn load(self: Box<Self>, source: &mut PipeReader) -> LoadResult<LoadStatus> {
        let destination = self.destination();
        let SqliteLoader {
            mut conn,
            table,
            max_bad_records,
            ..
        } = *self;
        let staging = format!("{}{}", table, STAGING_SUFFIX);

        // Dropping the transaction without commit rolls everything back
        let tx = conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", staging))?;
        tx.execute(&schema::create_table_sql(&staging), [])?;

        let mut rejections = Rejections::new(max_bad_records);
        let rows_loaded = {
            let mut stmt = tx.prepare(&schema::insert_sql(&staging))?;
            for_each_row(source, &mut rejections, |row| {
                let modified = row
                    .modified
                    .map(|m| m.format(MODIFIED_FORMAT).to_string());
                stmt.execute(params![
                    row.path,
                    row.mode,
                    row.user,
                    row.group,
                    row.size,
                    modified,
                    row.target,
                    row.error,
                ])?;
                Ok(())
            })?
        };
        debug!(rows = rows_loaded, staging = %staging, "Staging table filled");

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS \"{table}\";\n\
             ALTER TABLE \"{staging}\" RENAME TO \"{table}\";\n\
             CREATE INDEX IF NOT EXISTS \"idx_{table}_path\" ON \"{table}\"(\"Path\");",
            table = table,
            staging = staging,
        ))?;

        schema::set_load_info(&tx, &table, keys::ROWS_LOADED, &rows_loaded.to_string())?;
        schema::set_load_info(&tx, &table, keys::ROWS_REJECTED, &rejections.count().to_string())?;
        schema::set_load_info(&tx, &table, keys::LOADED_AT, &chrono::Utc::now().to_rfc3339())?;
        schema::set_load_info(&tx, &table, keys::LOADER_VERSION, env!("CARGO_PKG_VERSION"))?;

        tx.commit()?;

        Ok(LoadStatus {
            destination,
            rows_loaded,
            rows_rejected: rejections.count(),
            rejections: rejections.into_kept(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::pipe::pipe;
    use std::io::Write;
    use std::thread;
    use tempfile::TempDir;

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |r| r.get(0))
            .unwrap()
    }

    fn load_text(db: &Path, text: &'static str, close: bool, allowed: u64) -> LoadResult<LoadStatus> {
        let loader = Box::new(SqliteLoader::open(db, "files", allowed).unwrap());
        let (mut w, mut r) = pipe(4);
        let writer = thread::spawn(move || {
            w.write_all(text.as_bytes()).unwrap();
            if close {
                w.close().unwrap();
            } else {
                w.abort("producer failed").unwrap();
            }
        });
        let result = loader.load(&mut r);
        writer.join().unwrap();
        result
    }

    #[test]
    fn test_rejects_invalid_table_name() {
        let temp = TempDir::new().unwrap();
        let result = SqliteLoader::open(&temp.path().join("t.db"), "bad name", 0);
        assert!(matches!(result, Err(LoadError::OpenFailed { .. })));
    }

    #[test]
    fn test_load_creates_table() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("t.db");

        let status = load_text(
            &db,
            "/a/f1\t-rw-r--r--\troot\troot\t12\t2024-01-02T03:04:05\t\t\n/a/f2\t\t\t\t\t\t\tdenied\n",
            true,
            0,
        )
        .unwrap();
        assert_eq!(status.rows_loaded, 2);
        assert_eq!(status.rows_rejected, 0);
        assert!(status.destination.ends_with(":files"));

        let conn = Connection::open(&db).unwrap();
        assert_eq!(count(&conn, "files"), 2);

        let (size, modified, user): (i64, String, String) = conn
            .query_row(
                "SELECT \"Size\", \"Modified\", \"User\" FROM files WHERE \"Path\" = '/a/f1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(size, 12);
        assert_eq!(modified, "2024-01-02T03:04:05");
        assert_eq!(user, "root");

        // Missing values are NULL, not empty strings
        let mode: Option<String> = conn
            .query_row("SELECT \"Mode\" FROM files WHERE \"Path\" = '/a/f2'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mode, None);

        assert_eq!(
            schema::get_load_info(&conn, "files", keys::ROWS_LOADED).unwrap(),
            Some("2".to_string())
        );
    }

    #[test]
    fn test_load_replaces_existing_table() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("t.db");

        load_text(&db, "/old/1\t\t\t\t\t\t\t\n/old/2\t\t\t\t\t\t\t\n/old/3\t\t\t\t\t\t\t\n", true, 0).unwrap();
        load_text(&db, "/new/1\t\t\t\t\t\t\t\n", true, 0).unwrap();

        let conn = Connection::open(&db).unwrap();
        assert_eq!(count(&conn, "files"), 1);
        let path: String = conn
            .query_row("SELECT \"Path\" FROM files", [], |r| r.get(0))
            .unwrap();
        assert_eq!(path, "/new/1");
    }

    #[test]
    fn test_aborted_stream_keeps_previous_table() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("t.db");

        load_text(&db, "/old/1\t\t\t\t\t\t\t\n/old/2\t\t\t\t\t\t\t\n", true, 0).unwrap();
        let result = load_text(&db, "/new/1\t\t\t\t\t\t\t\n", false, 0);
        assert!(matches!(result, Err(LoadError::SourceAborted(_))));

        let conn = Connection::open(&db).unwrap();
        assert_eq!(count(&conn, "files"), 2);

        let staging_left: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'files__staging'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(staging_left, 0);
    }

    #[test]
    fn test_too_many_bad_records_keeps_previous_table() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("t.db");

        load_text(&db, "/old/1\t\t\t\t\t\t\t\n", true, 0).unwrap();
        let result = load_text(&db, "/new/1\t\t\t\tbig\t\t\t\n/new/2\t\t\t\tbad\t\t\t\n", true, 1);
        assert!(matches!(result, Err(LoadError::TooManyBadRecords { rejected: 2, .. })));

        let conn = Connection::open(&db).unwrap();
        let path: String = conn
            .query_row("SELECT \"Path\" FROM files", [], |r| r.get(0))
            .unwrap();
        assert_eq!(path, "/old/1");
    }

    #[test]
    fn test_bad_records_within_allowance_commit() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("t.db");

        let status = load_text(&db, "/a\t\t\t\tx\t\t\t\n/b\t\t\t\t\t\t\t\n", true, 1).unwrap();
        assert_eq!(status.rows_loaded, 1);
        assert_eq!(status.rows_rejected, 1);
        assert_eq!(status.rejections[0].row, 1);
    }
}
