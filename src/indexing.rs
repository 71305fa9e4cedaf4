//! Line indexing of large, growing log files.
//!
//! This module builds and maintains the [`LineIndex`] of a file: byte
//! offsets of every line end, the longest line, the detected encoding and the
//! digests used to tell appended data from a truncated or rotated file.

pub mod data;
pub mod digest;
pub mod encoding;
pub mod line_positions;
pub mod operation;
pub mod scanner;
pub mod worker;

pub use data::{IndexContents, IndexReader, IndexWriter, LineIndex};
pub use digest::{ChangeStatus, IndexedHash};
pub use encoding::TextEncoding;
pub use operation::{IndexOperation, OperationContext, OperationResult};
pub use worker::{IndexingEvent, IndexingWorker, LoadingStatus};
