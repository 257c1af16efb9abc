//! Chunked upload flow for app binaries.
//!
//! Pushes an APK or IPA to the version server in fixed-size chunks over a
//! three-step session protocol. The orchestrator owns the business logic;
//! the network lives behind [`SessionTransport`], with [`HttpTransport`] as
//! the production implementation.
//!
//! # Pipeline
//!
//! 1. **Validate**: file name, size ceiling, extension and metadata
//! 2. **Acquire**: claim the `(app, platform, version)` target
//! 3. **Start**: open a server session
//! 4. **Chunks**: send each range in order, reporting progress
//! 5. **Complete**: commit, then compare the server digest to the local one

pub mod error;
pub mod http;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod transport;
pub mod types;

pub use error::{CompleteFailure, UploadError, UploadPhase};
pub use http::HttpTransport;
pub use orchestrator::{ActiveUpload, UploadOrchestrator};
pub use registry::{UploadGuard, UploadRegistry};
pub use retry::{RetryPolicy, RetryingTransport};
pub use transport::{
    ChunkAck, ErrorType, SessionTransport, StartUpload, TransportError, TransportFuture,
};
pub use types::{UploadOptions, UploadReport};
