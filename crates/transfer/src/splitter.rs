use crate::TransferError;

/// A contiguous byte range `[start, end)` of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    /// Zero-based position in the upload order.
    pub index: u32,
    /// First byte offset (inclusive).
    pub start: u64,
    /// Last byte offset (exclusive).
    pub end: u64,
}

impl ChunkRange {
    /// Length of the range in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Always `false` for ranges produced by the splitter.
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Number of chunks needed to cover `total_size` bytes: `ceil(total / chunk)`.
pub fn total_chunks(total_size: u64, chunk_size: u64) -> Result<u32, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }
    u32::try_from(total_size.div_ceil(chunk_size)).map_err(|_| TransferError::InvalidChunkSize)
}

/// Partitions `[0, total_size)` into ordered fixed-size ranges.
///
/// Every range but the last is exactly `chunk_size` long. An empty file
/// yields no ranges.
pub fn split(total_size: u64, chunk_size: u64) -> Result<Vec<ChunkRange>, TransferError> {
    Ok(ChunkRanges::new(total_size, chunk_size)?.collect())
}

/// Lazy form of [`split`].
///
/// Cloning restarts the sequence from the current position, so a fresh
/// `ChunkRanges` can be built any number of times with identical output.
#[derive(Debug, Clone)]
pub struct ChunkRanges {
    total_size: u64,
    chunk_size: u64,
    total: u32,
    next: u32,
}

impl ChunkRanges {
    /// Creates the range plan. Fails if `chunk_size` is zero.
    pub fn new(total_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        let total = total_chunks(total_size, chunk_size)?;
        Ok(Self {
            total_size,
            chunk_size,
            total,
            next: 0,
        })
    }

    /// Total number of ranges in the plan.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Size of the file being partitioned.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Fixed chunk size of the plan.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Returns the range for `index` without iterating.
    pub fn range(&self, index: u32) -> Result<ChunkRange, TransferError> {
        if index >= self.total {
            return Err(TransferError::ChunkOutOfRange {
                index,
                total: self.total,
            });
        }
        let start = u64::from(index) * self.chunk_size;
        let end = start.saturating_add(self.chunk_size).min(self.total_size);
        Ok(ChunkRange { index, start, end })
    }
}

impl Iterator for ChunkRanges {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<ChunkRange> {
        let range = self.range(self.next).ok()?;
        self.next += 1;
        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkRanges {}
