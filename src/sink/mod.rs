//! Serialization side of the pipeline
//!
//! Records are rendered as tab-delimited rows and pushed through a
//! bounded byte pipe whose read end is handed to the load job.
//!
//! ```text
//! record stream ──► RecordSerializer ──► BufWriter ──► PipeWriter
//!                                                          │ bounded chunks
//!                                                          ▼
//!                                                     PipeReader ──► load job
//! ```

pub mod pipe;
pub mod serializer;
pub mod tsv;

pub use pipe::{pipe, PipeReader, PipeWriter};
pub use serializer::{RecordSerializer, RunState, SerializerStats};
pub use tsv::{RowReader, TableRow, COLUMNS, COLUMN_COUNT};
