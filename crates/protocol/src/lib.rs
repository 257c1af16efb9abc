//! Wire types for the AppVault version-storage service.
//!
//! Covers the three-phase chunked upload API (`start`, `chunk`, `complete`)
//! plus the health probe. Request bodies are form-encoded, responses are JSON.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use messages::{
    ApiErrorBody, CommittedArtifact, HealthResponse, StartUploadRequest, StartUploadResponse,
};
pub use types::{ParsePlatformError, Platform, SessionState, UploadMetadata, UploadTarget};
