//! Chunked file transfer building blocks.
//!
//! Splits a binary into fixed-size byte ranges, reads one range at a time,
//! tracks per-session chunk completion and turns acknowledgments into
//! progress signals.

mod chunked;
mod progress;
mod session;
mod splitter;
mod validation;

pub use chunked::{ChunkReader, FileDigest, calculate_file_checksum, checksum_bytes};
pub use progress::{
    ChannelReporter, ChunkProgress, NoopReporter, ProgressReporter, ThroughputWindow,
    notify_isolated,
};
pub use session::UploadSession;
pub use splitter::{ChunkRange, ChunkRanges, split, total_chunks};
pub use validation::{
    UploadLimits, ValidationError, validate_file_name, validate_metadata, validate_upload,
    validate_version,
};

use appvault_protocol::SessionState;

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = appvault_protocol::constants::CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("chunk {index} is out of range (total chunks: {total})")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("short read for chunk {index}: expected {expected} bytes, got {actual}")]
    ShortRead {
        index: u32,
        expected: u64,
        actual: u64,
    },

    #[error("session not complete: {completed} of {total} chunks acknowledged")]
    IncompleteSession { completed: u32, total: u32 },

    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
