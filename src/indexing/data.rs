//! Thread-safe line index for one file
//!
//! The index is written by exactly one indexing operation at a time and read
//! by any number of consumers. All access goes through two scoped guard
//! types: [`IndexReader`] holds the shared lock and only exposes queries,
//! [`IndexWriter`] holds the exclusive lock and adds the mutations. Both
//! release the lock when dropped, whatever the exit path.
//!
//! A writer commits one whole block at a time, so a reader only ever sees
//! the index as it stood between two blocks.

use crate::error::{LogscanError, Result};
use crate::indexing::digest::{Digest, EdgeWindows, FileDigest, IndexedHash};
use crate::indexing::encoding::TextEncoding;
use crate::indexing::line_positions::LinePositionArray;
use crate::indexing::scanner::{OpenLine, ParsedBlock};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, Range};

/// Line boundaries, statistics and digests of one file
///
/// Shared between the indexing worker and consumers through an `Arc`.
#[derive(Debug, Default)]
pub struct LineIndex {
    contents: RwLock<IndexContents>,
}

impl LineIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the shared lock for reading
    pub fn read(&self) -> IndexReader<'_> {
        IndexReader {
            guard: self.contents.read(),
        }
    }

    /// Acquire the exclusive lock for mutation
    ///
    /// Only the indexing operations call this; consumers use [`read`](Self::read).
    pub fn mutate(&self) -> IndexWriter<'_> {
        IndexWriter {
            guard: self.contents.write(),
        }
    }
}

/// The data behind the lock
///
/// Query methods are public and reachable through either guard; mutations
/// are private to this module and only reachable through [`IndexWriter`].
#[derive(Debug, Default)]
pub struct IndexContents {
    /// Offset one past the end of each line, terminator included
    line_positions: LinePositionArray,

    /// Longest line seen so far, in display columns
    max_length: u64,

    /// Rolling digest over all committed bytes
    hash_builder: FileDigest,
    hash: IndexedHash,

    /// Header and tail windows the change classifier compares against
    edges: EdgeWindows,

    /// Measuring state of a line whose terminator has not been read yet
    open_line: OpenLine,

    encoding_guess: Option<TextEncoding>,
    encoding_forced: Option<TextEncoding>,
}

impl IndexContents {
    /// Number of indexed lines
    pub fn line_count(&self) -> u64 {
        self.line_positions.len()
    }

    /// Length of the longest line, in display columns
    pub fn max_line_length(&self) -> u64 {
        self.max_length
    }

    /// Byte offset one past the end of `line` (where the next line begins)
    ///
    /// # Errors
    /// * `LineOutOfRange` if `line >= line_count()`
    pub fn position_of_line(&self, line: u64) -> Result<u64> {
        self.line_positions
            .get(line)
            .ok_or(LogscanError::LineOutOfRange {
                line,
                line_count: self.line_count(),
            })
    }

    /// Byte range of `line`, terminator included
    pub fn line_range(&self, line: u64) -> Result<Range<u64>> {
        let end = self.position_of_line(line)?;
        let start = match line {
            0 => 0,
            _ => self.position_of_line(line - 1)?,
        };
        Ok(start..end)
    }

    /// Offset where the line being indexed next begins
    pub fn last_line_end(&self) -> u64 {
        self.line_positions.last().unwrap_or(0)
    }

    /// Bytes committed to the index; a partial index resumes here
    pub fn indexed_size(&self) -> u64 {
        self.hash.size
    }

    pub fn hash(&self) -> IndexedHash {
        self.hash
    }

    pub fn encoding_guess(&self) -> Option<TextEncoding> {
        self.encoding_guess
    }

    pub fn forced_encoding(&self) -> Option<TextEncoding> {
        self.encoding_forced
    }

    /// The encoding lines should be read with: forced, else guessed
    pub fn effective_encoding(&self) -> Option<TextEncoding> {
        self.encoding_forced.or(self.encoding_guess)
    }

    /// Heap bytes held by the line positions
    pub fn allocated_size(&self) -> usize {
        self.line_positions.allocated_size()
    }

    pub(crate) fn open_line(&self) -> &OpenLine {
        &self.open_line
    }

    fn append_block(
        &mut self,
        block: &[u8],
        parsed: &ParsedBlock,
        encoding_guess: Option<TextEncoding>,
    ) {
        debug_assert!(parsed
            .line_ends
            .last()
            .map_or(true, |&end| end <= self.hash.size + block.len() as u64));

        if self.encoding_guess.is_none() {
            self.encoding_guess = encoding_guess;
        }

        self.line_positions.extend_from_slice(&parsed.line_ends);
        self.max_length = self.max_length.max(parsed.max_line_length);

        self.hash_builder.add_data(block);
        self.hash.size += block.len() as u64;
        self.hash.full_digest = self.hash_builder.digest();

        if !block.is_empty() {
            self.edges.add_data(block);
            let (header, header_size) = self.edges.header();
            self.set_header_digest(header, header_size);
            let (tail, tail_size) = self.edges.tail();
            self.set_tail_digest(tail, self.hash.size - tail_size, tail_size);
        }

        self.open_line = parsed.open_line.clone();
    }

    fn set_header_digest(&mut self, digest: Digest, size: u64) {
        self.hash.header_digest = digest;
        self.hash.header_size = size;
    }

    fn set_tail_digest(&mut self, digest: Digest, offset: u64, size: u64) {
        self.hash.tail_digest = digest;
        self.hash.tail_offset = offset;
        self.hash.tail_size = size;
    }

    fn clear(&mut self) {
        *self = IndexContents::default();
    }
}

/// Shared-lock view of a [`LineIndex`]
pub struct IndexReader<'a> {
    guard: RwLockReadGuard<'a, IndexContents>,
}

impl Deref for IndexReader<'_> {
    type Target = IndexContents;

    fn deref(&self) -> &IndexContents {
        &self.guard
    }
}

/// Exclusive-lock handle on a [`LineIndex`]
pub struct IndexWriter<'a> {
    guard: RwLockWriteGuard<'a, IndexContents>,
}

impl Deref for IndexWriter<'_> {
    type Target = IndexContents;

    fn deref(&self) -> &IndexContents {
        &self.guard
    }
}

impl IndexWriter<'_> {
    /// Commit one scanned block
    ///
    /// Appends the block's line ends, raises the maximum line length, folds
    /// the bytes into the rolling digest and records the state of the line
    /// still open at the end of the block. Existing entries are never touched.
    pub fn append_block(
        &mut self,
        block: &[u8],
        parsed: &ParsedBlock,
        encoding_guess: Option<TextEncoding>,
    ) {
        self.guard.append_block(block, parsed, encoding_guess);
    }

    /// Overwrite the recorded header digest
    ///
    /// `append_block` already keeps it current for the committed bytes.
    pub fn set_header_digest(&mut self, digest: Digest, size: u64) {
        self.guard.set_header_digest(digest, size);
    }

    /// Overwrite the recorded tail digest
    pub fn set_tail_digest(&mut self, digest: Digest, offset: u64, size: u64) {
        self.guard.set_tail_digest(digest, offset, size);
    }

    /// Sizes of the header and tail windows; only valid on an empty index
    pub fn set_digest_windows(&mut self, header_size: u64, tail_size: u64) {
        debug_assert_eq!(self.guard.hash.size, 0);
        self.guard.edges = EdgeWindows::new(header_size, tail_size);
    }

    pub fn set_encoding_guess(&mut self, encoding: TextEncoding) {
        self.guard.encoding_guess = Some(encoding);
    }

    pub fn force_encoding(&mut self, encoding: Option<TextEncoding>) {
        self.guard.encoding_forced = encoding;
    }

    /// Drop everything, including the encodings
    pub fn clear(&mut self) {
        self.guard.clear();
    }
}
