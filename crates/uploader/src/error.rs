//! Upload error types.

use std::fmt;

use appvault_protocol::UploadTarget;
use appvault_transfer::{TransferError, ValidationError};

use crate::transport::{ErrorType, TransportError};

/// Stage of the upload flow an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Validate,
    Acquire,
    Start,
    Chunk,
    Complete,
    Verify,
    Local,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadPhase::Validate => "validate",
            UploadPhase::Acquire => "acquire",
            UploadPhase::Start => "start",
            UploadPhase::Chunk => "chunk",
            UploadPhase::Complete => "complete",
            UploadPhase::Verify => "verify",
            UploadPhase::Local => "local",
        };
        f.write_str(s)
    }
}

/// Why a `complete` call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteFailure {
    /// The server has not received every chunk. Re-send and retry.
    MissingChunks,
    /// Assembly or verification failed server-side. The session is lost.
    Corrupt,
    /// Network or timeout. The call may be retried.
    Transport,
}

impl CompleteFailure {
    /// Maps a transport error from `complete` to a failure kind.
    pub fn classify(err: &TransportError) -> Self {
        match err {
            TransportError::Api { status, detail } => {
                if *status == 409 || mentions_missing_chunks(detail) {
                    CompleteFailure::MissingChunks
                } else if matches!(*status, 408 | 429 | 502 | 503 | 504) {
                    CompleteFailure::Transport
                } else {
                    CompleteFailure::Corrupt
                }
            }
            other if other.error_type() == ErrorType::Client => CompleteFailure::Corrupt,
            _ => CompleteFailure::Transport,
        }
    }

    pub fn is_retryable(self) -> bool {
        !matches!(self, CompleteFailure::Corrupt)
    }
}

/// Whether a plain-text `detail` reports chunks the server never received.
///
/// Structured bodies (validation lists rendered as JSON) never match, even
/// when an entry carries `"type": "missing"`.
fn mentions_missing_chunks(detail: &str) -> bool {
    let text = detail.trim_start();
    if text.starts_with('[') || text.starts_with('{') {
        return false;
    }
    text.to_ascii_lowercase().contains("missing chunk")
}

impl fmt::Display for CompleteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompleteFailure::MissingChunks => "missing chunks",
            CompleteFailure::Corrupt => "corrupt",
            CompleteFailure::Transport => "transport",
        };
        f.write_str(s)
    }
}

/// Errors produced by the upload flow.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid upload: {0}")]
    Validation(#[from] ValidationError),

    #[error("an upload to {target} is already in progress")]
    ConcurrentUpload { target: UploadTarget },

    #[error("failed to open upload session: {0}")]
    SessionCreate(#[source] TransportError),

    #[error(
        "chunk {index} of session {session_id} failed after {completed_chunks}/{total_chunks} chunks ({bytes_transferred} bytes) committed: {source}"
    )]
    Chunk {
        session_id: String,
        index: u32,
        completed_chunks: u32,
        total_chunks: u32,
        bytes_transferred: u64,
        #[source]
        source: TransportError,
    },

    #[error("failed to complete session {session_id} ({kind}): {source}")]
    Complete {
        session_id: String,
        kind: CompleteFailure,
        #[source]
        source: TransportError,
    },

    #[error("upload cancelled")]
    Cancelled,

    #[error("content hash mismatch: local {local}, server {remote}")]
    HashMismatch { local: String, remote: String },

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}

impl UploadError {
    /// The phase that produced this error.
    pub fn phase(&self) -> UploadPhase {
        match self {
            UploadError::Validation(_) => UploadPhase::Validate,
            UploadError::ConcurrentUpload { .. } => UploadPhase::Acquire,
            UploadError::SessionCreate(_) => UploadPhase::Start,
            UploadError::Chunk { .. } => UploadPhase::Chunk,
            UploadError::Complete { .. } => UploadPhase::Complete,
            UploadError::HashMismatch { .. } => UploadPhase::Verify,
            UploadError::Cancelled | UploadError::Transfer(_) => UploadPhase::Local,
        }
    }

    /// Whether repeating the failed step might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::SessionCreate(e) | UploadError::Chunk { source: e, .. } => {
                e.error_type().is_retryable()
            }
            UploadError::Complete { kind, .. } => kind.is_retryable(),
            UploadError::ConcurrentUpload { .. } => true,
            _ => false,
        }
    }

    /// The underlying transport error, if the failure came from the network.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            UploadError::SessionCreate(e)
            | UploadError::Chunk { source: e, .. }
            | UploadError::Complete { source: e, .. } => Some(e),
            _ => None,
        }
    }
}
