use serde::{Deserialize, Serialize};

use crate::types::{Platform, UploadMetadata};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens a chunked upload session.
///
/// Sent form-encoded, so every field is a scalar; the changelog travels as
/// a JSON array encoded into a single string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartUploadRequest {
    pub app_identifier: String,
    pub version: String,
    pub version_code: u32,
    pub platform: Platform,
    pub is_mandatory: bool,
    pub changelog: String,
    pub file_size: u64,
    pub file_name: String,
}

impl StartUploadRequest {
    /// Builds the start payload from session metadata and file facts.
    pub fn new(
        metadata: &UploadMetadata,
        file_name: &str,
        file_size: u64,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            app_identifier: metadata.app_identifier.clone(),
            version: metadata.version.clone(),
            version_code: metadata.version_code,
            platform: metadata.platform,
            is_mandatory: metadata.is_mandatory,
            changelog: serde_json::to_string(&metadata.changelog)?,
            file_size,
            file_name: file_name.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Acknowledges session creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartUploadResponse {
    pub upload_id: String,
}

/// Durable record returned once a session is committed.
///
/// Older servers report the size as `file_size` and the digest as
/// `file_hash`; both spellings are accepted, and the current name wins
/// when a body carries both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCommittedArtifact")]
pub struct CommittedArtifact {
    pub version: String,
    pub platform: Platform,
    pub final_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<i64>,
}

/// Accepts current and legacy field names side by side.
#[derive(Deserialize)]
struct RawCommittedArtifact {
    version: String,
    platform: Platform,
    #[serde(default)]
    final_size: Option<u64>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    content_hash: Option<String>,
    #[serde(default)]
    file_hash: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    version_id: Option<i64>,
}

impl TryFrom<RawCommittedArtifact> for CommittedArtifact {
    type Error = String;

    fn try_from(raw: RawCommittedArtifact) -> Result<Self, Self::Error> {
        let final_size = raw
            .final_size
            .or(raw.file_size)
            .ok_or_else(|| "missing field `final_size`".to_string())?;
        Ok(Self {
            version: raw.version,
            platform: raw.platform,
            final_size,
            content_hash: raw.content_hash.or(raw.file_hash),
            download_url: raw.download_url,
            version_id: raw.version_id,
        })
    }
}

/// Error body returned with non-2xx statuses.
///
/// `detail` is usually a string but validation failures carry a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub detail: serde_json::Value,
}

impl ApiErrorBody {
    /// Renders `detail` as human-readable text.
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Health probe response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
