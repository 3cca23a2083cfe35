//! Upload, retrieval and lifecycle pipelines.
//!
//! Handlers translate HTTP into calls on [`FileService`]; the service owns
//! every interaction between the blob store and the metadata store.

mod chunked;
mod download;
mod lifecycle;
mod upload;

pub use download::Download;
pub use lifecycle::DeleteOutcome;
pub use upload::SingleUpload;

use crate::error::{ApiError, ApiResult};
use depot_core::config::ServerConfig;
use depot_core::{ContentHash, ContentKey, FileId, LogicalFile, file_extension};
use depot_metadata::repos::FileRepo;
use depot_metadata::{FileRow, MetadataStore};
use depot_storage::BlobStore;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::warn;

/// Size limits applied by the upload pipelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadLimits {
    pub default_chunk_size: u64,
    pub min_chunk_size: u64,
    pub max_chunk_size: u64,
    pub max_upload_size: u64,
    /// Age after which a 'merging' session is considered abandoned.
    pub merge_stale_after: Duration,
}

impl From<&ServerConfig> for UploadLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            default_chunk_size: config.default_chunk_size,
            min_chunk_size: config.min_chunk_size,
            max_chunk_size: config.max_chunk_size,
            max_upload_size: config.max_upload_size,
            merge_stale_after: Duration::seconds(
                i64::try_from(config.merge_stale_after_secs).unwrap_or(i64::MAX),
            ),
        }
    }
}

/// Entry point for all file operations.
#[derive(Clone)]
pub struct FileService {
    storage: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    limits: UploadLimits,
}

impl FileService {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        limits: UploadLimits,
    ) -> Self {
        Self {
            storage,
            metadata,
            limits,
        }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Look up a logical file descriptor.
    pub async fn get_file(&self, file_id: FileId) -> ApiResult<LogicalFile> {
        let row = self
            .metadata
            .get_file(file_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("file {file_id}")))?;
        Ok(row.into_file()?)
    }

    /// Insert a logical file pointing at `content_key`.
    async fn record_file(&self, file: &LogicalFile) -> ApiResult<()> {
        let row = FileRow::from_file(file)?;
        self.metadata.create_file(&row).await?;
        Ok(())
    }

    /// Remove a blob nothing references, logging instead of failing.
    async fn discard_blob(&self, key: &ContentKey) {
        match self.storage.delete(key).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(content_key = %key, error = %e, "Failed to remove unreferenced blob");
            }
        }
    }
}

/// Build a new logical file descriptor.
fn new_logical_file(
    id: FileId,
    name: &str,
    size: u64,
    hash: ContentHash,
    content_key: ContentKey,
    uploader_id: i64,
) -> LogicalFile {
    LogicalFile {
        id,
        name: name.to_string(),
        extension: file_extension(name),
        size,
        hash,
        content_key,
        is_dir: false,
        uploader_id,
        created_at: OffsetDateTime::now_utc(),
    }
}
