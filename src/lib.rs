//! # logscan - Incremental Line Indexing for Large Log Files
//!
//! Builds and maintains a line index of very large, growing log files and
//! filters their lines with regular expressions.
//!
//! ## Features
//!
//! - **Block Scanning**: Files are read in fixed-size blocks; every block is
//!   committed to the index whole, so readers never see a half-scanned block
//! - **Incremental Updates**: Appended data is indexed from where the last scan
//!   stopped; digests of the file's head and tail tell appends from rotation
//! - **Encodings**: UTF-8, UTF-16 (both byte orders) and Latin-1, guessed or forced
//! - **Fast Filtering**: Literal patterns run on an Aho-Corasick automaton,
//!   everything else on the ripgrep regex engine
//!
//! ## Architecture
//!
//! - [`error`] - Centralized error types and handling
//! - [`config`] - Indexing parameters
//! - [`indexing`] - Line index, block scanner and background worker
//! - [`search`] - Pattern compilation and line filtering

pub mod config;
pub mod error;
pub mod indexing;
pub mod search;

// Re-export commonly used types for convenience
pub use config::IndexingConfig;
pub use error::{LogscanError, Result};
pub use indexing::{ChangeStatus, IndexingEvent, IndexingWorker, LineIndex, LoadingStatus, TextEncoding};
pub use search::{CompiledExpression, FilteredLines, Matcher, Pattern};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
