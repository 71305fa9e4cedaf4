//! Block scanner: streams a file into a [`LineIndex`]
//!
//! The file is read in blocks of `block_size` bytes. Each block is split on
//! line feeds (memchr for single-byte encodings, code units for UTF-16),
//! every completed line is measured in display columns, and the block is
//! committed to the index in one write-lock scope. The line still open at the
//! end of a block is carried in [`OpenLine`], which is committed along with
//! the block so a later scan picks it up exactly where this one stopped.

use crate::config::IndexingConfig;
use crate::indexing::data::LineIndex;
use crate::indexing::encoding::TextEncoding;
use log::trace;
use memchr::{memchr3, memchr_iter};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};

/// Measuring state of a line whose terminator has not been seen yet
///
/// Everything here is bounded: a line of any length costs a few bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenLine {
    /// Display columns so far
    columns: u64,

    /// The last character was a carriage return
    ///
    /// A CR right before the terminator is not displayed, so it is taken
    /// back when the line closes.
    last_was_cr: bool,

    /// Last two bytes of a UTF-8 line, to recognise zero-width characters
    /// whose encoding straddles a block boundary
    recent: [u8; 2],

    /// First byte of a UTF-16 code unit cut by the end of a block
    split_unit: Option<u8>,
}

impl OpenLine {
    /// Measure a run of single-byte-encoding bytes containing no line feed
    fn measure_bytes(&mut self, bytes: &[u8], encoding: TextEncoding, tab_width: u64) {
        if bytes.is_empty() {
            return;
        }

        let utf8 = encoding == TextEncoding::Utf8;
        let pending_sequence = utf8 && self.recent.iter().any(|&b| is_zero_width_lead(b));
        if !pending_sequence && memchr3(b'\t', 0xEF, 0xE2, bytes).is_none() {
            // Fast path: no tabs and no zero-width candidates
            self.columns += if utf8 {
                bytes.iter().filter(|&&b| !is_continuation(b)).count() as u64
            } else {
                bytes.len() as u64
            };
            self.last_was_cr = bytes.last() == Some(&b'\r');
            self.remember(bytes);
            return;
        }

        for &b in bytes {
            match b {
                b'\t' => self.advance_tab(tab_width),
                b'\r' => {
                    self.columns += 1;
                    self.last_was_cr = true;
                }
                _ if utf8 && is_continuation(b) => {
                    if completes_zero_width(self.recent, b) {
                        self.columns = self.columns.saturating_sub(1);
                    }
                    self.last_was_cr = false;
                }
                _ => {
                    self.columns += 1;
                    self.last_was_cr = false;
                }
            }
            self.recent = [self.recent[1], b];
        }
    }

    /// Measure one UTF-16 code unit that is not a line feed
    fn measure_unit(&mut self, unit: u16, tab_width: u64) {
        match unit {
            0x09 => self.advance_tab(tab_width),
            0x0D => {
                self.columns += 1;
                self.last_was_cr = true;
            }
            // Low surrogates complete a character already counted
            0xDC00..=0xDFFF => self.last_was_cr = false,
            0xFEFF | 0x200B..=0x200D => self.last_was_cr = false,
            _ => {
                self.columns += 1;
                self.last_was_cr = false;
            }
        }
    }

    fn advance_tab(&mut self, tab_width: u64) {
        self.columns += tab_width - self.columns % tab_width;
        self.last_was_cr = false;
    }

    fn remember(&mut self, bytes: &[u8]) {
        match bytes {
            [] => {}
            [only] => self.recent = [self.recent[1], *only],
            [.., a, b] => self.recent = [*a, *b],
        }
    }

    /// Close the line and return its length
    fn finish(&mut self) -> u64 {
        let mut length = self.columns - u64::from(self.last_was_cr);
        if self.split_unit.is_some() {
            // A dangling half code unit shows as a replacement character
            length += 1;
        }
        *self = OpenLine::default();
        length
    }
}

fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Lead bytes of U+FEFF (EF BB BF) and U+200B..U+200D (E2 80 8B..8D)
fn is_zero_width_lead(b: u8) -> bool {
    b == 0xEF || b == 0xE2
}

fn completes_zero_width(recent: [u8; 2], last: u8) -> bool {
    matches!(
        (recent, last),
        ([0xEF, 0xBB], 0xBF) | ([0xE2, 0x80], 0x8B..=0x8D)
    )
}

/// Results of parsing one block, ready to be committed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBlock {
    /// Absolute offsets one past each line feed found in the block
    pub line_ends: Vec<u64>,
    /// Longest line completed in this block
    pub max_line_length: u64,
    /// State of the line left open at the end of the block
    pub open_line: OpenLine,
}

/// Per-operation scanning state; never outlives one operation
#[derive(Debug)]
pub(crate) struct IndexingState {
    /// Next byte to read
    pub pos: u64,
    /// Where the currently open line began
    pub line_start: u64,
    pub line: OpenLine,
    pub encoding: TextEncoding,
    pub tab_width: u64,
}

impl IndexingState {
    /// Split and measure one block starting at `self.pos`
    pub fn parse_block(&mut self, block: &[u8]) -> ParsedBlock {
        let block_start = self.pos;
        let mut line_ends = Vec::new();
        let mut max_line_length = 0;

        match self.encoding {
            TextEncoding::Utf8 | TextEncoding::Latin1 => {
                let mut segment_start = 0;
                for feed in memchr_iter(b'\n', block) {
                    self.line
                        .measure_bytes(&block[segment_start..feed], self.encoding, self.tab_width);
                    max_line_length = max_line_length.max(self.line.finish());
                    line_ends.push(block_start + feed as u64 + 1);
                    segment_start = feed + 1;
                }
                self.line
                    .measure_bytes(&block[segment_start..], self.encoding, self.tab_width);
            }
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
                let mut i = 0;
                if let (Some(first), Some(&second)) = (self.line.split_unit, block.first()) {
                    self.line.split_unit = None;
                    let unit = self.encoding.code_unit(first, second);
                    self.handle_unit(unit, block_start + 1, &mut line_ends, &mut max_line_length);
                    i = 1;
                }
                while i + 1 < block.len() {
                    let unit = self.encoding.code_unit(block[i], block[i + 1]);
                    let end = block_start + i as u64 + 2;
                    self.handle_unit(unit, end, &mut line_ends, &mut max_line_length);
                    i += 2;
                }
                if i < block.len() {
                    self.line.split_unit = Some(block[i]);
                }
            }
        }

        if let Some(&last) = line_ends.last() {
            self.line_start = last;
        }
        self.pos += block.len() as u64;

        ParsedBlock {
            line_ends,
            max_line_length,
            open_line: self.line.clone(),
        }
    }

    fn handle_unit(&mut self, unit: u16, end: u64, line_ends: &mut Vec<u64>, max: &mut u64) {
        if unit == 0x0A {
            *max = (*max).max(self.line.finish());
            line_ends.push(end);
        } else {
            self.line.measure_unit(unit, self.tab_width);
        }
    }

    /// Close the open line at end of file, if it holds anything
    ///
    /// The index treats end of file as an implicit terminator.
    pub fn finish_at_eof(&mut self) -> Option<ParsedBlock> {
        if self.pos <= self.line_start {
            return None;
        }
        let length = self.line.finish();
        self.line_start = self.pos;
        Some(ParsedBlock {
            line_ends: vec![self.pos],
            max_line_length: length,
            open_line: OpenLine::default(),
        })
    }
}

/// How a scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Reached the end of the file as it was when the scan started
    Finished,
    /// Stopped at a block boundary because the interrupt flag was raised
    Interrupted,
}

/// Index `file` from `start` to its current end
///
/// # Arguments
/// * `file` - Open handle on the indexed file
/// * `start` - Offset to resume at; must equal the index's committed size
/// * `index` - Index to commit blocks into
/// * `interrupt` - Checked before every block
/// * `progress` - Called with a non-decreasing percentage whenever it moves
///
/// # Errors
/// * I/O errors; blocks committed before the error stay in the index
pub(crate) fn index_blocks(
    file: &mut File,
    start: u64,
    index: &LineIndex,
    interrupt: &AtomicBool,
    config: &IndexingConfig,
    progress: &mut dyn FnMut(u8),
) -> io::Result<ScanOutcome> {
    let end = file.metadata()?.len();
    file.seek(SeekFrom::Start(start))?;

    let mut state = {
        let reader = index.read();
        debug_assert_eq!(reader.indexed_size(), start);
        IndexingState {
            pos: start,
            line_start: reader.last_line_end(),
            line: reader.open_line().clone(),
            encoding: reader.effective_encoding().unwrap_or(TextEncoding::Utf8),
            tab_width: u64::from(config.tab_width),
        }
    };
    let mut needs_guess = index.read().effective_encoding().is_none();

    let mut buffer = vec![0u8; config.block_size];
    let mut reported = None;

    while state.pos < end {
        if interrupt.load(Ordering::Relaxed) {
            trace!("scan interrupted at offset {}", state.pos);
            return Ok(ScanOutcome::Interrupted);
        }

        let wanted = usize::try_from(end - state.pos)
            .map_or(buffer.len(), |left| left.min(buffer.len()));
        let read = read_block(file, &mut buffer[..wanted])?;
        if read == 0 {
            // The file shrank under us; stop at what is there
            break;
        }
        let block = &buffer[..read];

        let guess = if needs_guess {
            needs_guess = false;
            state.encoding = TextEncoding::guess(block);
            Some(state.encoding)
        } else {
            None
        };

        let parsed = state.parse_block(block);
        index.mutate().append_block(block, &parsed, guess);
        trace!(
            "committed {} bytes, {} lines, up to offset {}",
            read,
            parsed.line_ends.len(),
            state.pos
        );

        let percent = percent_done(start, state.pos, end);
        if reported != Some(percent) {
            reported = Some(percent);
            progress(percent);
        }
    }

    if interrupt.load(Ordering::Relaxed) {
        return Ok(ScanOutcome::Interrupted);
    }

    if let Some(last_line) = state.finish_at_eof() {
        index.mutate().append_block(&[], &last_line, None);
    }
    if reported != Some(100) {
        progress(100);
    }
    Ok(ScanOutcome::Finished)
}

fn percent_done(start: u64, pos: u64, end: u64) -> u8 {
    if end <= start {
        return 100;
    }
    (((pos - start) as u128 * 100) / (end - start) as u128).min(100) as u8
}

/// Fill `buffer` unless end of file comes first; returns the bytes read
fn read_block(file: &mut File, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
