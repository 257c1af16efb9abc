use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::TransferError;
use crate::splitter::ChunkRange;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Incremental SHA-256 over chunks fed in file order.
///
/// Chunks fed out of order or twice produce a different digest, so callers
/// feed each index exactly once, ascending.
#[derive(Clone, Default)]
pub struct FileDigest {
    hasher: Sha256,
    next_offset: u64,
}

impl FileDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorbs the bytes of `range`. Returns `false` (and ignores the data)
    /// when `range` does not start where the previous one ended.
    pub fn update(&mut self, range: &ChunkRange, data: &[u8]) -> bool {
        if range.start != self.next_offset {
            return false;
        }
        self.hasher.update(data);
        self.next_offset = range.end;
        true
    }

    /// Bytes absorbed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.next_offset
    }

    /// Hex digest of everything absorbed.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads the bytes of individual chunk ranges from a file.
///
/// Only one chunk buffer exists at a time; ranges may be read in any order
/// (a retried index is simply read again).
pub struct ChunkReader {
    file: std::fs::File,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for ranged reading.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self { file, file_size })
    }

    /// Reads exactly the bytes of `range`.
    ///
    /// A file that shrank since the plan was made yields
    /// [`TransferError::ShortRead`].
    pub fn read_range(&mut self, range: &ChunkRange) -> Result<Vec<u8>, TransferError> {
        let expected = range.len();
        self.file.seek(SeekFrom::Start(range.start))?;

        let mut buf = Vec::with_capacity(expected as usize);
        let actual = (&mut self.file).take(expected).read_to_end(&mut buf)? as u64;
        if actual != expected {
            return Err(TransferError::ShortRead {
                index: range.index,
                expected,
                actual,
            });
        }
        Ok(buf)
    }

    /// File size observed when the reader was opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}
