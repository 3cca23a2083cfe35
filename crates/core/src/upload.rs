//! Resumable upload session types and chunk arithmetic.

use crate::file::LogicalFile;
use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

crate::uuid_id! {
    /// Identifier of a resumable upload session ("part file").
    ///
    /// The logical file produced when the session completes reuses this id.
    SessionId
}

/// Persistent status of a part file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartFileStatus {
    /// Never written: new sessions start in `Uploading`. A stored `init`
    /// still parses and is handled like `Uploading`.
    Init,
    /// Accepting chunks.
    Uploading,
    /// A complete call is concatenating chunks.
    Merging,
    Complete,
    /// The last merge attempt failed; complete may be retried.
    Error,
}

impl PartFileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Uploading => "uploading",
            Self::Merging => "merging",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// Whether chunks may still be uploaded.
    pub fn accepts_chunks(&self) -> bool {
        matches!(self, Self::Init | Self::Uploading | Self::Error)
    }
}

impl fmt::Display for PartFileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartFileStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "init" => Ok(Self::Init),
            "uploading" => Ok(Self::Uploading),
            "merging" => Ok(Self::Merging),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            other => Err(crate::Error::UploadSession(format!(
                "unknown part file status: {other}"
            ))),
        }
    }
}

/// Business state reported to clients by init and complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// More chunks are required before the file exists.
    Uploading,
    /// The logical file exists.
    Complete,
}

/// Number of chunks needed for `size` bytes at `chunk_size` bytes per chunk.
pub fn expected_chunk_count(size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size)
}

/// Exact byte length required for chunk `index`, or `None` if the index is out of range.
pub fn expected_chunk_len(size: u64, chunk_size: u64, index: u64) -> Option<u64> {
    let total = expected_chunk_count(size, chunk_size);
    if index >= total {
        return None;
    }
    if index + 1 == total {
        Some(size - index * chunk_size)
    } else {
        Some(chunk_size)
    }
}

/// Check a declared chunk size against configured bounds.
pub fn validate_chunk_size(chunk_size: u64, min: u64, max: u64) -> crate::Result<()> {
    if chunk_size < min || chunk_size > max || chunk_size == 0 {
        return Err(crate::Error::InvalidChunkSize {
            size: chunk_size,
            min,
            max,
        });
    }
    Ok(())
}

/// Request body for upload-init.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub filename: String,
    #[serde(alias = "md5")]
    pub hash: ContentHash,
    pub size: u64,
    /// Falls back to the server default when omitted.
    #[serde(default)]
    pub chunk_size: Option<u64>,
}

/// A resumable upload session as seen by clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartFileSession {
    pub session_id: SessionId,
    pub name: String,
    pub size: u64,
    pub hash: ContentHash,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub status: PartFileStatus,
    /// Indices already received, ascending.
    pub uploaded_chunks: Vec<u64>,
}

/// Response body for upload-init.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub state: UploadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<LogicalFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_file_session: Option<PartFileSession>,
}

/// Response body for a chunk upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    pub session_id: SessionId,
    pub chunk_index: u64,
    pub size: u64,
    pub hash: ContentHash,
    /// True when an identical chunk was already stored at this index.
    pub deduplicated: bool,
}

/// Request body for upload-complete.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub session_id: SessionId,
}

/// Response body for upload-complete.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub state: UploadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<LogicalFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_chunks: Vec<u64>,
}
