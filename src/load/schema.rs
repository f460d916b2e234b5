//! SQLite schema for the destination table
//!
//! The destination table mirrors the row format column for column. A
//! small `load_info` table keeps per-table metadata about the last load.

use crate::error::LoadResult;
use crate::sink::tsv::{ColumnType, COLUMNS};
use rusqlite::Connection;

/// Suffix of the staging table a load fills before the swap
pub const STAGING_SUFFIX: &str = "__staging";

/// SQL to create the load metadata table
const CREATE_LOAD_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS load_info (
    table_name TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT,
    PRIMARY KEY (table_name, key)
)
"#;

/// SQLite pragmas for the load connection
///
/// Durability stays on: the table swap must survive a crash intact.
const LOAD_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;      -- 64MB cache
PRAGMA temp_store = MEMORY;
"#;

/// Check that a table name is a plain SQL identifier
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::String => "TEXT",
        ColumnType::Integer => "INTEGER",
        ColumnType::Timestamp => "TEXT",
    }
}

/// `CREATE TABLE` for a destination-shaped table
pub fn create_table_sql(table: &str) -> String {
    let columns: Vec<String> = COLUMNS
        .iter()
        .map(|c| {
            let null = if c.nullable { "" } else { " NOT NULL" };
            format!("    \"{}\" {}{}", c.name, sql_type(c.column_type), null)
        })
        .collect();
    format!("CREATE TABLE \"{}\" (\n{}\n)", table, columns.join(",\n"))
}

/// Parameterized `INSERT` for a destination-shaped table
pub fn insert_sql(table: &str) -> String {
    let names: Vec<String> = COLUMNS.iter().map(|c| format!("\"{}\"", c.name)).collect();
    let params: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        table,
        names.join(", "),
        params.join(", ")
    )
}

/// Apply load pragmas and create metadata tables
pub fn prepare_database(conn: &Connection) -> LoadResult<()> {
    conn.execute_batch(LOAD_PRAGMAS)?;
    conn.execute(CREATE_LOAD_INFO_TABLE, [])?;
    Ok(())
}

/// Store load metadata for a table
pub fn set_load_info(conn: &Connection, table: &str, key: &str, value: &str) -> LoadResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO load_info (table_name, key, value) VALUES (?1, ?2, ?3)",
        [table, key, value],
    )?;
    Ok(())
}

/// Get load metadata for a table
pub fn get_load_info(conn: &Connection, table: &str, key: &str) -> LoadResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM load_info WHERE table_name = ?1 AND key = ?2",
        [table, key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Metadata keys recorded per load
pub mod keys {
    /// Rows in the replaced table
    pub const ROWS_LOADED: &str = "rows_loaded";

    /// Rows rejected during the load
    pub const ROWS_REJECTED: &str = "rows_rejected";

    /// Timestamp the replace committed (RFC 3339)
    pub const LOADED_AT: &str = "loaded_at";

    /// Tool version that performed the load
    pub const LOADER_VERSION: &str = "loader_version";
}
