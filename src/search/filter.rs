//! Filtered view of an indexed file
//!
//! Runs a [`CompiledExpression`] over a range of indexed lines and keeps the
//! numbers of the lines that match. The range is cut into shards of
//! `search_chunk_lines` lines searched in parallel on rayon's pool; every
//! shard opens its own file handle and owns its own [`Matcher`].

use crate::error::{LogscanError, Result};
use crate::indexing::{LineIndex, TextEncoding};
use crate::search::matcher::{CompiledExpression, Matcher};
use log::{debug, trace};
use rayon::prelude::*;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Matching line numbers of one file for one expression
pub struct FilteredLines {
    path: PathBuf,
    index: Arc<LineIndex>,
    expression: CompiledExpression,
    chunk_lines: usize,
    matches: Vec<u64>,
    /// Lines below this number have been searched
    searched_lines: u64,
}

impl FilteredLines {
    pub fn new(
        path: impl AsRef<Path>,
        index: Arc<LineIndex>,
        expression: CompiledExpression,
        chunk_lines: usize,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            index,
            expression,
            chunk_lines: chunk_lines.max(1),
            matches: Vec::new(),
            searched_lines: 0,
        }
    }

    /// Search up to line `end` and merge the hits into the result
    ///
    /// `end` is clamped to the indexed line count. The searched lines always
    /// form one prefix of the file: lines already searched are skipped, and a
    /// `start` past the first unsearched line is ignored so nothing in
    /// between is left out. Calling this again after a partial index only
    /// looks at the new lines.
    ///
    /// # Returns
    /// * Number of new matching lines
    pub fn update_search(&mut self, start: u64, end: u64) -> Result<usize> {
        let end = end.min(self.index.read().line_count());
        if start > self.searched_lines {
            debug!(
                "search of lines from {start} resumes at line {} instead",
                self.searched_lines
            );
        }
        let start = self.searched_lines;
        if start >= end {
            return Ok(0);
        }

        let found = search_lines(
            &self.path,
            &self.index,
            &self.expression,
            start..end,
            self.chunk_lines,
        )?;
        debug!(
            "{} new match(es) in lines {start}..{end} of {}",
            found.len(),
            self.path.display()
        );

        let added = found.len();
        self.matches.extend(found);
        self.searched_lines = end;
        Ok(added)
    }

    /// Search every indexed line not searched yet
    pub fn search_new_lines(&mut self) -> Result<usize> {
        let end = self.index.read().line_count();
        self.update_search(self.searched_lines, end)
    }

    /// Forget every result, e.g. after the file was truncated
    pub fn clear(&mut self) {
        self.matches.clear();
        self.searched_lines = 0;
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Line number of the `n`th match
    pub fn match_line(&self, n: usize) -> Option<u64> {
        self.matches.get(n).copied()
    }

    pub fn matches(&self) -> &[u64] {
        &self.matches
    }

    pub fn searched_lines(&self) -> u64 {
        self.searched_lines
    }

    pub fn expression(&self) -> &CompiledExpression {
        &self.expression
    }
}

/// Line numbers in `lines` whose text satisfies `expression`, ascending
///
/// # Errors
/// * `LineOutOfRange` if the index shrank below `lines` while searching
/// * `FileNotFound` if the file is gone
/// * `FileError` if the file cannot be read
pub fn search_lines(
    path: &Path,
    index: &LineIndex,
    expression: &CompiledExpression,
    lines: Range<u64>,
    chunk_lines: usize,
) -> Result<Vec<u64>> {
    let encoding = index
        .read()
        .effective_encoding()
        .unwrap_or(TextEncoding::Utf8);

    let step = chunk_lines.max(1) as u64;
    let shards: Vec<Range<u64>> = (lines.start..lines.end)
        .step_by(step as usize)
        .map(|first| first..(first + step).min(lines.end))
        .collect();

    let found = shards
        .into_par_iter()
        .map(|shard| {
            let mut matcher = expression.create_matcher();
            search_shard(path, index, encoding, &mut matcher, shard)
        })
        .collect::<Result<Vec<Vec<u64>>>>()?;

    Ok(found.into_iter().flatten().collect())
}

fn search_shard(
    path: &Path,
    index: &LineIndex,
    encoding: TextEncoding,
    matcher: &mut Matcher,
    shard: Range<u64>,
) -> Result<Vec<u64>> {
    // Copy the shard's line ends so the read lock is not held during I/O
    let (start_offset, line_ends) = {
        let reader = index.read();
        let start_offset = reader.line_range(shard.start)?.start;
        let line_ends = shard
            .clone()
            .map(|line| reader.position_of_line(line))
            .collect::<Result<Vec<u64>>>()?;
        (start_offset, line_ends)
    };
    let end_offset = line_ends.last().copied().unwrap_or(start_offset);

    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LogscanError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => LogscanError::file_error(format!("Cannot open {}", path.display()), e),
    })?;
    file.seek(SeekFrom::Start(start_offset))?;
    let mut buffer = Vec::with_capacity((end_offset - start_offset) as usize);
    (&mut file)
        .take(end_offset - start_offset)
        .read_to_end(&mut buffer)?;
    if (buffer.len() as u64) < end_offset - start_offset {
        return Err(LogscanError::file_error(
            format!("{} is shorter than its index", path.display()),
            std::io::ErrorKind::UnexpectedEof.into(),
        ));
    }

    trace!("searching lines {shard:?} ({} bytes)", buffer.len());
    let mut found = Vec::new();
    let mut line_start = 0usize;
    for (line, end) in shard.zip(line_ends) {
        let line_end = (end - start_offset) as usize;
        let mut bytes = encoding.strip_line_terminator(&buffer[line_start..line_end]);
        if line == 0 {
            bytes = encoding.strip_bom(bytes);
        }
        line_start = line_end;

        let is_match = match encoding {
            TextEncoding::Utf8 => matcher.has_match(bytes),
            _ => matcher.has_match_str(&encoding.decode(bytes)),
        };
        if is_match {
            found.push(line);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::indexing::{IndexOperation, OperationContext};
    use crate::search::pattern::Pattern;
    use std::io::Write;
    use std::sync::atomic::AtomicBool;
    use tempfile::NamedTempFile;

    fn create_test_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content).expect("Failed to write test content");
        file.flush().expect("Failed to flush test file");
        file
    }

    fn index_file(path: &Path, index: &LineIndex, operation: IndexOperation) {
        let interrupt = AtomicBool::new(false);
        let config = IndexingConfig {
            block_size: 16,
            ..IndexingConfig::default()
        };
        let ctx = OperationContext {
            path,
            index,
            interrupt: &interrupt,
            config: &config,
        };
        operation.run(&ctx, &mut |_| {});
    }

    fn full_index(path: &Path) -> Arc<LineIndex> {
        let index = Arc::new(LineIndex::new());
        index_file(path, &index, IndexOperation::FullIndex { forced_encoding: None });
        index
    }

    #[test]
    fn test_search_across_shards() {
        let mut content = String::new();
        for i in 0..50 {
            let level = if i % 7 == 0 { "ERROR" } else { "INFO" };
            content.push_str(&format!("{i} {level} message\r\n"));
        }
        let file = create_test_file(content.as_bytes());
        let index = full_index(file.path());
        let expression = CompiledExpression::compile(&Pattern::new("ERROR")).unwrap();

        let mut filtered = FilteredLines::new(file.path(), index, expression, 3);
        let added = filtered.search_new_lines().unwrap();

        let expected: Vec<u64> = (0..50).filter(|i| i % 7 == 0).collect();
        assert_eq!(added, expected.len());
        assert_eq!(filtered.matches(), expected.as_slice());
        assert_eq!(filtered.match_line(1), Some(7));
        assert_eq!(filtered.match_line(100), None);
    }

    #[test]
    fn test_terminator_is_not_matched() {
        let file = create_test_file(b"end\r\nmiddle\r\n");
        let index = full_index(file.path());
        let expression = CompiledExpression::compile(&Pattern::new("d$")).unwrap();
        let found = search_lines(file.path(), &index, &expression, 0..2, 10).unwrap();
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn test_update_after_append() {
        let mut file = create_test_file(b"GET /a\nPOST /b\n");
        let index = full_index(file.path());
        let expression = CompiledExpression::compile(&Pattern::new("GET")).unwrap();
        let mut filtered = FilteredLines::new(file.path(), Arc::clone(&index), expression, 100);
        assert_eq!(filtered.search_new_lines().unwrap(), 1);

        file.write_all(b"GET /c\nGET /d\n").unwrap();
        file.flush().unwrap();
        index_file(file.path(), &index, IndexOperation::PartialIndex);

        assert_eq!(filtered.search_new_lines().unwrap(), 2);
        assert_eq!(filtered.matches(), &[0, 2, 3]);
        assert_eq!(filtered.searched_lines(), 4);

        filtered.clear();
        assert_eq!(filtered.match_count(), 0);
        assert_eq!(filtered.search_new_lines().unwrap(), 3);
    }

    #[test]
    fn test_utf16_lines_are_decoded() {
        let mut content = vec![0xFF, 0xFE];
        for text in ["caf\u{e9} ouvert\n", "ferm\u{e9}\n"] {
            content.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        }
        let file = create_test_file(&content);
        let index = full_index(file.path());
        assert_eq!(index.read().encoding_guess(), Some(TextEncoding::Utf16Le));

        let expression = CompiledExpression::compile(&Pattern::new("^caf\u{e9}")).unwrap();
        let found = search_lines(file.path(), &index, &expression, 0..2, 1).unwrap();
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn test_range_past_index_is_clamped() {
        let file = create_test_file(b"x\ny\n");
        let index = full_index(file.path());
        let expression = CompiledExpression::compile(&Pattern::new("y")).unwrap();
        let mut filtered = FilteredLines::new(file.path(), index, expression, 10);
        assert_eq!(filtered.update_search(0, 1000).unwrap(), 1);
        assert_eq!(filtered.searched_lines(), 2);
    }

    #[test]
    fn test_later_start_does_not_skip_lines() {
        let file = create_test_file(b"hit\nmiss\nhit\nmiss\nhit\n");
        let index = full_index(file.path());
        let expression = CompiledExpression::compile(&Pattern::new("hit")).unwrap();
        let mut filtered = FilteredLines::new(file.path(), index, expression, 2);

        assert_eq!(filtered.update_search(2, 5).unwrap(), 3);
        assert_eq!(filtered.update_search(0, 5).unwrap(), 0);
        assert_eq!(filtered.matches(), &[0, 2, 4]);
        assert_eq!(filtered.searched_lines(), 5);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let file = create_test_file(b"a\nb\n");
        let index = full_index(file.path());
        let expression = CompiledExpression::compile(&Pattern::new("a")).unwrap();
        let path = file.path().to_path_buf();
        drop(file);

        match search_lines(&path, &index, &expression, 0..2, 10) {
            Err(LogscanError::FileNotFound { path: missing }) => assert_eq!(missing, path),
            other => panic!("expected FileNotFound, got {other:?}"),
        }
    }
}
