//! Destination schema and tab-delimited row format
//!
//! Rows are LF-terminated, tab-separated, with no header. Fields that
//! contain a tab, a double quote, CR or LF are wrapped in double quotes
//! with inner quotes doubled. Missing values are empty fields.

use crate::fs::FileRecord;
use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::io::{self, BufRead, Write};

/// Civil timestamp format used for the `Modified` column
pub const MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Column value types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Integer,
    Timestamp,
}

/// One destination column
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub description: &'static str,
}

/// Destination schema in wire order
pub const COLUMNS: [Column; 8] = [
    Column {
        name: "Path",
        column_type: ColumnType::String,
        nullable: false,
        description: "Absolute path to the file",
    },
    Column {
        name: "Mode",
        column_type: ColumnType::String,
        nullable: true,
        description: "File mode bits",
    },
    Column {
        name: "User",
        column_type: ColumnType::String,
        nullable: true,
        description: "Owner user name of the file",
    },
    Column {
        name: "Group",
        column_type: ColumnType::String,
        nullable: true,
        description: "Owner group name of the file",
    },
    Column {
        name: "Size",
        column_type: ColumnType::Integer,
        nullable: true,
        description: "Size of the file, in bytes",
    },
    Column {
        name: "Modified",
        column_type: ColumnType::Timestamp,
        nullable: true,
        description: "Timestamp of the last file modification",
    },
    Column {
        name: "Target",
        column_type: ColumnType::String,
        nullable: true,
        description: "Target of the symlink, if applicable",
    },
    Column {
        name: "Error",
        column_type: ColumnType::String,
        nullable: true,
        description: "Error in retrieval of file stats",
    },
];

/// Number of columns per row
pub const COLUMN_COUNT: usize = COLUMNS.len();

fn needs_quotes(field: &str) -> bool {
    field.bytes().any(|b| matches!(b, b'\t' | b'"' | b'\r' | b'\n'))
}

fn quote(field: &str) -> Cow<'_, str> {
    if needs_quotes(field) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Column values of a record in schema order (empty for missing values)
pub fn record_fields(record: &FileRecord) -> [String; COLUMN_COUNT] {
    [
        record.path.clone(),
        record.mode_string().unwrap_or_default(),
        record.owner.clone().unwrap_or_default(),
        record.group.clone().unwrap_or_default(),
        record.size.map(|s| s.to_string()).unwrap_or_default(),
        record
            .modified
            .map(|m| m.format(MODIFIED_FORMAT).to_string())
            .unwrap_or_default(),
        record.target.clone().unwrap_or_default(),
        record.error.clone().unwrap_or_default(),
    ]
}

/// Write already-rendered fields as one row
pub fn write_fields<W: Write, S: AsRef<str>>(out: &mut W, fields: &[S]) -> io::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.write_all(b"\t")?;
        }
        out.write_all(quote(field.as_ref()).as_bytes())?;
    }
    out.write_all(b"\n")
}

/// Write one record as one row
pub fn write_row<W: Write>(out: &mut W, record: &FileRecord) -> io::Result<()> {
    write_fields(out, &record_fields(record))
}

/// Render one record as a row string (including the trailing newline)
pub fn format_row(record: &FileRecord) -> String {
    let mut buf = Vec::with_capacity(128);
    // Writing to a Vec cannot fail
    let _ = write_row(&mut buf, record);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Reads rows back from a tab-delimited stream
pub struct RowReader<R> {
    inner: R,
    line: Vec<u8>,
}

impl<R: BufRead> RowReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: Vec::with_capacity(256),
        }
    }

    /// Read the next row, `None` at end of stream
    pub fn read_row(&mut self) -> io::Result<Option<Vec<String>>> {
        let mut fields: Vec<String> = Vec::with_capacity(COLUMN_COUNT);
        let mut field: Vec<u8> = Vec::new();
        let mut in_quotes = false;
        let mut at_field_start = true;
        let mut started = false;

        loop {
            self.line.clear();
            if self.inner.read_until(b'\n', &mut self.line)? == 0 {
                if !started {
                    return Ok(None);
                }
                if in_quotes {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "unterminated quoted field at end of stream",
                    ));
                }
                fields.push(String::from_utf8_lossy(&field).into_owned());
                return Ok(Some(fields));
            }
            started = true;

            let mut i = 0;
            while i < self.line.len() {
                let b = self.line[i];
                i += 1;

                if in_quotes {
                    if b == b'"' {
                        if self.line.get(i) == Some(&b'"') {
                            field.push(b'"');
                            i += 1;
                        } else {
                            in_quotes = false;
                        }
                    } else {
                        field.push(b);
                    }
                    continue;
                }

                match b {
                    b'"' if at_field_start => {
                        in_quotes = true;
                        at_field_start = false;
                    }
                    b'\t' => {
                        fields.push(String::from_utf8_lossy(&field).into_owned());
                        field.clear();
                        at_field_start = true;
                    }
                    b'\n' => {
                        fields.push(String::from_utf8_lossy(&field).into_owned());
                        return Ok(Some(fields));
                    }
                    _ => {
                        field.push(b);
                        at_field_start = false;
                    }
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for RowReader<R> {
    type Item = io::Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_row().transpose()
    }
}

/// A row validated against the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub path: String,
    pub mode: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub size: Option<i64>,
    pub modified: Option<NaiveDateTime>,
    pub target: Option<String>,
    pub error: Option<String>,
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl TableRow {
    /// Validate raw fields, returning a rejection reason on failure
    pub fn from_fields(fields: Vec<String>) -> Result<Self, String> {
        if fields.len() != COLUMN_COUNT {
            return Err(format!(
                "expected {} columns, found {}",
                COLUMN_COUNT,
                fields.len()
            ));
        }

        let mut it = fields.into_iter();
        let mut next = || it.next().unwrap_or_default();

        let path = next();
        if path.is_empty() {
            return Err("required column Path is empty".to_string());
        }
        let mode = non_empty(next());
        let user = non_empty(next());
        let group = non_empty(next());
        let size = match non_empty(next()) {
            Some(s) => Some(
                s.parse::<i64>()
                    .map_err(|_| format!("column Size: invalid integer '{}'", s))?,
            ),
            None => None,
        };
        let modified = match non_empty(next()) {
            Some(s) => Some(
                NaiveDateTime::parse_from_str(&s, MODIFIED_FORMAT)
                    .map_err(|e| format!("column Modified: invalid timestamp '{}': {}", s, e))?,
            ),
            None => None,
        };
        let target = non_empty(next());
        let error = non_empty(next());

        Ok(Self {
            path,
            mode,
            user,
            group,
            size,
            modified,
            target,
            error,
        })
    }

    /// Fields in schema order (empty for missing values)
    pub fn fields(&self) -> [String; COLUMN_COUNT] {
        [
            self.path.clone(),
            self.mode.clone().unwrap_or_default(),
            self.user.clone().unwrap_or_default(),
            self.group.clone().unwrap_or_default(),
            self.size.map(|s| s.to_string()).unwrap_or_default(),
            self.modified
                .map(|m| m.format(MODIFIED_FORMAT).to_string())
                .unwrap_or_default(),
            self.target.clone().unwrap_or_default(),
            self.error.clone().unwrap_or_default(),
        ]
    }
}
