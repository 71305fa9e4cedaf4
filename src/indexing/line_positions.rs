//! Compact storage for line end offsets
//!
//! Indexing a multi-gigabyte log produces tens of millions of offsets, so
//! storing a full `u64` per line doubles the footprint for no benefit: the
//! high 32 bits of consecutive offsets almost never change. This module keeps
//! the low word of every offset and a short table of the points where the
//! high word changes.

/// Append-only array of strictly increasing byte offsets
///
/// # Layout
/// * `low_words[n]` - low 32 bits of offset `n`
/// * `high_words` - `(first_line, high)` pairs, sorted by `first_line`;
///   offset `n` uses the high word of the last pair with `first_line <= n`
///
/// Lines before the first pair have a high word of zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinePositionArray {
    /// Low 32 bits of every stored offset
    low_words: Vec<u32>,

    /// Change points of the high 32 bits
    ///
    /// One entry per 4 GiB boundary crossed, so this stays tiny.
    high_words: Vec<(u64, u32)>,
}

impl LinePositionArray {
    /// Create an empty array
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored offsets
    pub fn len(&self) -> u64 {
        self.low_words.len() as u64
    }

    /// True when nothing has been stored yet
    pub fn is_empty(&self) -> bool {
        self.low_words.is_empty()
    }

    /// Get the offset stored at `index`
    ///
    /// # Performance
    /// * O(log k) where k is the number of high word change points
    pub fn get(&self, index: u64) -> Option<u64> {
        let low = *self.low_words.get(usize::try_from(index).ok()?)?;
        Some((u64::from(self.high_word_for(index)) << 32) | u64::from(low))
    }

    /// The last stored offset, if any
    pub fn last(&self) -> Option<u64> {
        self.len().checked_sub(1).and_then(|index| self.get(index))
    }

    /// Append one offset
    ///
    /// Offsets must be strictly increasing; the caller (the scanner) never
    /// produces anything else.
    pub fn push(&mut self, offset: u64) {
        debug_assert!(
            self.last().map_or(true, |last| offset > last),
            "line offsets must be strictly increasing"
        );

        let high = (offset >> 32) as u32;
        let current_high = self.high_words.last().map_or(0, |&(_, high)| high);
        if high != current_high {
            self.high_words.push((self.len(), high));
        }
        self.low_words.push(offset as u32);
    }

    /// Append a run of offsets
    pub fn extend_from_slice(&mut self, offsets: &[u64]) {
        self.low_words.reserve(offsets.len());
        for &offset in offsets {
            self.push(offset);
        }
    }

    /// Drop every stored offset and release the memory
    pub fn clear(&mut self) {
        self.low_words = Vec::new();
        self.high_words = Vec::new();
    }

    /// Heap bytes currently held
    pub fn allocated_size(&self) -> usize {
        self.low_words.capacity() * std::mem::size_of::<u32>()
            + self.high_words.capacity() * std::mem::size_of::<(u64, u32)>()
    }

    fn high_word_for(&self, index: u64) -> u32 {
        let after = self
            .high_words
            .partition_point(|&(first_line, _)| first_line <= index);
        match after {
            0 => 0,
            n => self.high_words[n - 1].1,
        }
    }
}
