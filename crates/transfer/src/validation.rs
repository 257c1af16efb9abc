//! Pre-flight checks run before any network call.

use std::path::{Component, Path};

use appvault_protocol::constants::{CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE};
use appvault_protocol::{Platform, UploadMetadata};

/// Rejected upload inputs. Local only; never sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("file is empty")]
    EmptyFile,

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("file is {size} bytes, maximum allowed is {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("file {file_name} does not match platform {platform}")]
    ExtensionMismatch { file_name: String, platform: Platform },

    #[error("unrecognized file extension: {0} (expected .apk or .ipa)")]
    UnknownExtension(String),

    #[error("invalid version {0:?}: expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),

    #[error("version code must be at least 1")]
    InvalidVersionCode,

    #[error("app identifier is empty")]
    EmptyAppIdentifier,

    #[error("invalid file name: {0}")]
    InvalidFileName(String),
}

/// Size limits applied to an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub chunk_size: u64,
    pub max_file_size: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Validates the name sent to the server as the upload's file name.
///
/// Must be a single plain component: no separators, no `..`, not absolute.
pub fn validate_file_name(file_name: &str) -> Result<(), ValidationError> {
    if file_name.trim().is_empty() {
        return Err(ValidationError::InvalidFileName("empty name".into()));
    }
    if file_name.contains(['/', '\\']) {
        return Err(ValidationError::InvalidFileName(format!(
            "path separators not allowed: {file_name}"
        )));
    }

    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(ValidationError::InvalidFileName(format!(
            "not a plain file name: {file_name}"
        ))),
    }
}

/// Accepts exactly `MAJOR.MINOR.PATCH` with decimal components.
pub fn validate_version(version: &str) -> Result<(), ValidationError> {
    let parts: Vec<&str> = version.split('.').collect();
    let ok = parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidVersion(version.to_string()))
    }
}

/// Validates the metadata fields that do not depend on the file.
pub fn validate_metadata(metadata: &UploadMetadata) -> Result<(), ValidationError> {
    if metadata.app_identifier.trim().is_empty() {
        return Err(ValidationError::EmptyAppIdentifier);
    }
    validate_version(&metadata.version)?;
    if metadata.version_code < 1 {
        return Err(ValidationError::InvalidVersionCode);
    }
    Ok(())
}

/// Full pre-flight check for an upload of `size` bytes named `file_name`.
pub fn validate_upload(
    file_name: &str,
    size: u64,
    metadata: &UploadMetadata,
    limits: &UploadLimits,
) -> Result<(), ValidationError> {
    validate_file_name(file_name)?;
    if size == 0 {
        return Err(ValidationError::EmptyFile);
    }
    if limits.chunk_size == 0 {
        return Err(ValidationError::InvalidChunkSize);
    }
    if size > limits.max_file_size {
        return Err(ValidationError::FileTooLarge {
            size,
            max: limits.max_file_size,
        });
    }

    match Platform::from_file_name(file_name) {
        Some(p) if p == metadata.platform => {}
        Some(_) => {
            return Err(ValidationError::ExtensionMismatch {
                file_name: file_name.to_string(),
                platform: metadata.platform,
            });
        }
        None => return Err(ValidationError::UnknownExtension(file_name.to_string())),
    }

    validate_metadata(metadata)
}
