//! Data types for the upload flow.

use std::time::Duration;

use appvault_protocol::CommittedArtifact;
use appvault_protocol::constants::{CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE};
use appvault_transfer::UploadLimits;
use chrono::{DateTime, Utc};

/// Per-orchestrator upload settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    pub chunk_size: u64,
    /// Uploads larger than this are rejected before any network call.
    pub max_file_size: u64,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl UploadOptions {
    pub fn limits(&self) -> UploadLimits {
        UploadLimits {
            chunk_size: self.chunk_size,
            max_file_size: self.max_file_size,
        }
    }
}

/// Outcome of a committed upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub artifact: CommittedArtifact,
    pub session_id: String,
    pub file_name: String,
    pub total_chunks: u32,
    pub bytes_transferred: u64,
    /// Hex SHA-256 of the local file.
    pub local_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl UploadReport {
    /// Average throughput over the whole upload, in bytes per second.
    pub fn average_speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_transferred as f64 / secs
    }
}
