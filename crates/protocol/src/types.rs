use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Mobile platform a binary is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "android")]
    Android,
    #[serde(rename = "ios")]
    Ios,
}

impl Platform {
    /// Wire name of the platform.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    /// File extension (without the dot) accepted for this platform.
    pub fn extension(self) -> &'static str {
        match self {
            Platform::Android => "apk",
            Platform::Ios => "ipa",
        }
    }

    /// Infers the platform from a file name's extension (case-insensitive).
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        if ext.eq_ignore_ascii_case("apk") {
            Some(Platform::Android)
        } else if ext.eq_ignore_ascii_case("ipa") {
            Some(Platform::Ios)
        } else {
            None
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a platform tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform: {0} (expected android or ios)")]
pub struct ParsePlatformError(pub String);

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            _ => Err(ParsePlatformError(s.to_string())),
        }
    }
}

/// Caller-supplied descriptor attached to an upload session at creation.
///
/// The server decides whether the metadata is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub app_identifier: String,
    /// Semantic version string (`major.minor.patch`).
    pub version: String,
    /// Monotonic build number, must be at least 1.
    pub version_code: u32,
    pub platform: Platform,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changelog: Vec<String>,
}

impl UploadMetadata {
    /// The logical destination this upload commits to.
    pub fn target(&self) -> UploadTarget {
        UploadTarget {
            app_identifier: self.app_identifier.clone(),
            platform: self.platform,
            version: self.version.clone(),
        }
    }
}

/// `(application, platform, version)`: at most one upload in flight per target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadTarget {
    pub app_identifier: String,
    pub platform: Platform,
    pub version: String,
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.app_identifier, self.platform, self.version)
    }
}

/// Lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "completing")]
    Completing,
    #[serde(rename = "committed")]
    Committed,
    #[serde(rename = "failed")]
    Failed,
}

impl SessionState {
    /// `Committed` and `Failed` accept no further operations.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Committed | SessionState::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Uploading)
                | (Uploading, Completing)
                | (Completing, Committed)
                | (Created | Uploading | Completing, Failed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Uploading => "uploading",
            SessionState::Completing => "completing",
            SessionState::Committed => "committed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}
