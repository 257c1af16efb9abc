//! Session transport trait and its error type.
//!
//! `SessionTransport` is the seam between the upload flow and the network.
//! [`HttpTransport`](crate::http::HttpTransport) talks to the real service;
//! tests plug in mocks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use appvault_protocol::{CommittedArtifact, UploadMetadata};

/// Boxed future returned by every transport call.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Everything the server needs to open a session.
#[derive(Debug, Clone, PartialEq)]
pub struct StartUpload {
    pub metadata: UploadMetadata,
    pub file_name: String,
    pub file_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
}

/// Acknowledgment of one stored chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAck {
    pub index: u32,
    pub bytes: u64,
}

/// Retry classification for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Rejected request (4xx other than 408/429). Retrying will not help.
    Client,
    /// Temporary server condition (5xx, 408, 429).
    Server,
    /// Connection problems, timeouts, truncated bodies.
    Network,
}

impl ErrorType {
    /// Whether a retry might succeed.
    pub fn is_retryable(self) -> bool {
        self != ErrorType::Client
    }
}

/// Errors produced by a transport call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("API error {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("connection error: {0}")]
    Connection(String),
}

impl TransportError {
    /// Classifies the failure for retry decisions.
    pub fn error_type(&self) -> ErrorType {
        match self {
            TransportError::Api { status, .. } => classify_status(*status),
            TransportError::Http(e) => match e.status() {
                Some(status) if !e.is_timeout() => classify_status(status.as_u16()),
                _ => ErrorType::Network,
            },
            TransportError::InvalidApiKey => ErrorType::Client,
            TransportError::Timeout
            | TransportError::Decode(_)
            | TransportError::Connection(_) => ErrorType::Network,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Api { status, .. } => Some(*status),
            TransportError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

fn classify_status(status: u16) -> ErrorType {
    match status {
        408 | 429 => ErrorType::Server,
        400..=499 => ErrorType::Client,
        500..=599 => ErrorType::Server,
        _ => ErrorType::Network,
    }
}

/// Network operations of a chunked upload session.
///
/// Each call is one round trip. Implementations must be shareable across
/// tasks; the orchestrator holds them behind an `Arc`.
pub trait SessionTransport: Send + Sync {
    /// Opens a session and returns its server-assigned id.
    fn start<'a>(&'a self, request: &'a StartUpload) -> TransportFuture<'a, String>;

    /// Stores the bytes of chunk `index`. Re-sending an index replaces it.
    fn upload_chunk<'a>(
        &'a self,
        session_id: &'a str,
        index: u32,
        data: &'a [u8],
    ) -> TransportFuture<'a, ChunkAck>;

    /// Assembles the chunks and commits the artifact.
    fn complete<'a>(&'a self, session_id: &'a str) -> TransportFuture<'a, CommittedArtifact>;
}

impl<T: SessionTransport + ?Sized> SessionTransport for Arc<T> {
    fn start<'a>(&'a self, request: &'a StartUpload) -> TransportFuture<'a, String> {
        (**self).start(request)
    }

    fn upload_chunk<'a>(
        &'a self,
        session_id: &'a str,
        index: u32,
        data: &'a [u8],
    ) -> TransportFuture<'a, ChunkAck> {
        (**self).upload_chunk(session_id, index, data)
    }

    fn complete<'a>(&'a self, session_id: &'a str) -> TransportFuture<'a, CommittedArtifact> {
        (**self).complete(session_id)
    }
}
