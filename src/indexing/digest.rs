//! Content digests and the file change classifier.
//!
//! Polling a multi-gigabyte file for changes must not re-read it. The index
//! records a digest of a small header window and a small tail window of the
//! data it has seen; comparing those against the file today costs
//! O(header + tail) regardless of the file size.

use crate::config::DEFAULT_DIGEST_WINDOW;
use log::debug;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Fixed-size fingerprint of a byte range
pub type Digest = blake3::Hash;

/// Digest of zero bytes
pub fn empty_digest() -> Digest {
    blake3::hash(&[])
}

/// Rolling digest over every byte committed to an index
#[derive(Debug, Clone, Default)]
pub struct FileDigest {
    hasher: blake3::Hasher,
}

impl FileDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_data(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Digest of everything added so far; the state keeps rolling
    pub fn digest(&self) -> Digest {
        self.hasher.finalize()
    }

    pub fn reset(&mut self) {
        self.hasher.reset();
    }
}

/// Header and tail windows over the bytes committed to an index
///
/// The header digest covers the first `header_limit` bytes ever added, the
/// tail digest the last `tail_limit` bytes. Both are computed from the
/// committed bytes themselves, never from the file as it is later on.
#[derive(Debug, Clone)]
pub struct EdgeWindows {
    header_limit: u64,
    tail_limit: usize,
    header: FileDigest,
    header_size: u64,
    /// Copy of the last `tail_limit` committed bytes
    tail: Vec<u8>,
}

impl EdgeWindows {
    pub fn new(header_limit: u64, tail_limit: u64) -> Self {
        Self {
            header_limit,
            tail_limit: usize::try_from(tail_limit).unwrap_or(usize::MAX),
            header: FileDigest::new(),
            header_size: 0,
            tail: Vec::new(),
        }
    }

    pub fn add_data(&mut self, data: &[u8]) {
        let room = self.header_limit - self.header_size;
        let taken = usize::try_from(room).map_or(data.len(), |room| room.min(data.len()));
        if taken > 0 {
            self.header.add_data(&data[..taken]);
            self.header_size += taken as u64;
        }

        if data.len() >= self.tail_limit {
            self.tail.clear();
            self.tail
                .extend_from_slice(&data[data.len() - self.tail_limit..]);
        } else {
            self.tail.extend_from_slice(data);
            let excess = self.tail.len().saturating_sub(self.tail_limit);
            self.tail.drain(..excess);
        }
    }

    /// Digest and size of the header window
    pub fn header(&self) -> (Digest, u64) {
        (self.header.digest(), self.header_size)
    }

    /// Digest and size of the tail window
    pub fn tail(&self) -> (Digest, u64) {
        (blake3::hash(&self.tail), self.tail.len() as u64)
    }
}

impl Default for EdgeWindows {
    fn default() -> Self {
        Self::new(DEFAULT_DIGEST_WINDOW, DEFAULT_DIGEST_WINDOW)
    }
}

/// Digests recorded for the data as last indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedHash {
    /// Bytes committed to the index
    pub size: u64,
    /// Digest of `[0, size)`
    pub full_digest: Digest,

    pub header_size: u64,
    /// Digest of `[0, header_size)`
    pub header_digest: Digest,

    pub tail_size: u64,
    pub tail_offset: u64,
    /// Digest of `[tail_offset, tail_offset + tail_size)`
    pub tail_digest: Digest,
}

impl Default for IndexedHash {
    fn default() -> Self {
        Self {
            size: 0,
            full_digest: empty_digest(),
            header_size: 0,
            header_digest: empty_digest(),
            tail_size: 0,
            tail_offset: 0,
            tail_digest: empty_digest(),
        }
    }
}

/// How a file relates to the data last indexed from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    /// Same size, same header and tail
    Unchanged,
    /// Grew; the indexed prefix is intact, a partial index is safe
    DataAdded,
    /// Shrank, vanished, or the indexed prefix no longer matches
    Truncated,
}

/// Digest `len` bytes of `file` starting at `offset`
///
/// Fails with `UnexpectedEof` when the file holds fewer bytes than asked.
pub fn digest_range(file: &mut File, offset: u64, len: u64) -> io::Result<Digest> {
    file.seek(SeekFrom::Start(offset))?;
    let mut hasher = blake3::Hasher::new();
    let copied = io::copy(&mut (&mut *file).take(len), &mut hasher)?;
    if copied != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {len} bytes at offset {offset}, read {copied}"),
        ));
    }
    Ok(hasher.finalize())
}

/// Classify what happened to the file at `path` since `indexed` was recorded
///
/// # Returns
/// * `Truncated` if the file vanished, shrank, or its header or tail window
///   digests differ
/// * `DataAdded` if it grew and both windows still match
/// * `Unchanged` otherwise
///
/// # Errors
/// * I/O errors other than the file being missing
pub fn classify_file(path: &Path, indexed: &IndexedHash) -> io::Result<ChangeStatus> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} vanished, treating as truncated", path.display());
            return Ok(ChangeStatus::Truncated);
        }
        Err(e) => return Err(e),
    };
    let real_size = file.metadata()?.len();

    if real_size < indexed.size {
        debug!(
            "{} shrank from {} to {} bytes",
            path.display(),
            indexed.size,
            real_size
        );
        return Ok(ChangeStatus::Truncated);
    }

    if indexed.size == 0 {
        return Ok(if real_size == 0 {
            ChangeStatus::Unchanged
        } else {
            ChangeStatus::DataAdded
        });
    }

    let header = digest_range(&mut file, 0, indexed.header_size)?;
    if header != indexed.header_digest {
        debug!("{} header digest changed", path.display());
        return Ok(ChangeStatus::Truncated);
    }

    let tail = digest_range(&mut file, indexed.tail_offset, indexed.tail_size)?;
    if tail != indexed.tail_digest {
        debug!("{} tail digest changed", path.display());
        return Ok(ChangeStatus::Truncated);
    }

    Ok(if real_size == indexed.size {
        ChangeStatus::Unchanged
    } else {
        ChangeStatus::DataAdded
    })
}
