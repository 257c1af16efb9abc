use std::time::Duration;

/// Fixed chunk size for the chunked upload API (5 MiB).
///
/// Not negotiated with the server.
pub const CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default ceiling for a single binary (500 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Deadline for a single request.
///
/// Multi-minute so that a 5 MiB chunk survives a slow uplink.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Default service endpoint used when nothing is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Header carrying the service API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Header carrying a per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Header carrying the hex SHA-256 of a chunk body.
pub const CHUNK_CHECKSUM_HEADER: &str = "X-Chunk-Sha256";

/// Multipart field name for chunk data.
pub const CHUNK_FIELD: &str = "chunk";

/// Health probe path.
pub const HEALTH_PATH: &str = "/health";

const CHUNKED_BASE: &str = "/api/v2/version/upload-chunked";

/// Path that opens an upload session.
pub fn start_path() -> String {
    format!("{CHUNKED_BASE}/start")
}

/// Path that receives chunk `index` of session `upload_id`.
pub fn chunk_path(upload_id: &str, index: u32) -> String {
    format!("{CHUNKED_BASE}/{upload_id}/chunk/{index}")
}

/// Path that finalizes session `upload_id`.
pub fn complete_path(upload_id: &str) -> String {
    format!("{CHUNKED_BASE}/{upload_id}/complete")
}
