//! The three indexing operations
//!
//! An operation is a one-shot task: it runs to completion or to cancellation
//! and yields exactly one [`OperationResult`]. The set of operations is
//! closed, so they are an enum dispatched by [`IndexOperation::run`].

use crate::config::IndexingConfig;
use crate::indexing::data::LineIndex;
use crate::indexing::digest::{classify_file, ChangeStatus};
use crate::indexing::encoding::TextEncoding;
use crate::indexing::scanner::{index_blocks, ScanOutcome};
use log::{debug, warn};
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Work the indexing worker can schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOperation {
    /// Clear the index and scan the whole file
    FullIndex {
        forced_encoding: Option<TextEncoding>,
    },
    /// Scan only the bytes appended since the last scan
    ///
    /// The caller is expected to have seen `ChangeStatus::DataAdded` first.
    PartialIndex,
    /// Classify the file against the recorded digests; no scanning
    CheckFileChanges,
}

/// What an operation produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Scan ran to the end of the file; `false` when an I/O error stopped it
    Completed(bool),
    /// Interrupt observed at a block boundary (or before starting)
    Cancelled,
    /// Outcome of a `CheckFileChanges`
    FileStatus(ChangeStatus),
}

/// Everything an operation needs to run
pub struct OperationContext<'a> {
    pub path: &'a Path,
    pub index: &'a LineIndex,
    pub interrupt: &'a AtomicBool,
    pub config: &'a IndexingConfig,
}

impl IndexOperation {
    /// Run the operation on the calling thread
    ///
    /// `progress` receives a non-decreasing percentage for the scanning
    /// operations; `CheckFileChanges` never reports progress.
    pub fn run(&self, ctx: &OperationContext<'_>, progress: &mut dyn FnMut(u8)) -> OperationResult {
        if ctx.interrupt.load(Ordering::Relaxed) {
            debug!("{self:?} on {} cancelled before starting", ctx.path.display());
            return OperationResult::Cancelled;
        }

        match *self {
            IndexOperation::FullIndex { forced_encoding } => {
                {
                    let mut writer = ctx.index.mutate();
                    writer.clear();
                    writer.set_digest_windows(
                        ctx.config.header_digest_size,
                        ctx.config.tail_digest_size,
                    );
                    writer.force_encoding(forced_encoding);
                }
                debug!("full index of {}", ctx.path.display());
                scan(ctx, 0, progress)
            }
            IndexOperation::PartialIndex => {
                let start = ctx.index.read().indexed_size();
                debug!("partial index of {} from offset {start}", ctx.path.display());
                scan(ctx, start, progress)
            }
            IndexOperation::CheckFileChanges => {
                let indexed = ctx.index.read().hash();
                let status = match classify_file(ctx.path, &indexed) {
                    Ok(status) => status,
                    Err(e) => {
                        warn!("cannot check {}: {e}", ctx.path.display());
                        ChangeStatus::Truncated
                    }
                };
                debug!("{} is {status:?}", ctx.path.display());
                OperationResult::FileStatus(status)
            }
        }
    }
}

fn scan(ctx: &OperationContext<'_>, start: u64, progress: &mut dyn FnMut(u8)) -> OperationResult {
    let mut file = match File::open(ctx.path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound && start == 0 => {
            // A file that does not exist yet reads as empty
            debug!("{} does not exist, indexed as empty", ctx.path.display());
            progress(100);
            return OperationResult::Completed(true);
        }
        Err(e) => {
            warn!("cannot open {}: {e}", ctx.path.display());
            return OperationResult::Completed(false);
        }
    };

    let outcome = index_blocks(
        &mut file,
        start,
        ctx.index,
        ctx.interrupt,
        ctx.config,
        progress,
    );

    match outcome {
        Ok(ScanOutcome::Finished) => OperationResult::Completed(true),
        Ok(ScanOutcome::Interrupted) => OperationResult::Cancelled,
        Err(e) => {
            warn!("indexing {} failed: {e}", ctx.path.display());
            OperationResult::Completed(false)
        }
    }
}
