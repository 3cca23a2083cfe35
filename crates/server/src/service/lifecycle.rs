//! Reference-counted deletion.

use super::FileService;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use depot_core::{FileId, LogicalFile};
use depot_metadata::repos::FileRepo;
use depot_storage::BlobStore;
use tracing::{error, info, instrument};

/// Result of deleting a logical file.
#[derive(Debug)]
pub struct DeleteOutcome {
    pub file: LogicalFile,
    /// True when this was the last reference and the blob was removed.
    pub blob_deleted: bool,
}

impl FileService {
    /// Delete a logical file, removing its content once nothing references it.
    ///
    /// The record is removed first. A concurrent dedup hit between the count
    /// and the backend delete can leave that new file pointing at a missing
    /// blob.
    #[instrument(skip_all, fields(file_id = %file_id))]
    pub async fn delete_file(&self, file_id: FileId) -> ApiResult<DeleteOutcome> {
        let row = self
            .metadata
            .delete_file(file_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("file {file_id}")))?;
        let file = row.into_file()?;
        metrics::FILES_DELETED.inc();

        let remaining = self
            .metadata
            .count_files_by_content_key(&file.content_key)
            .await?;
        if remaining > 0 {
            info!(content_key = %file.content_key, remaining, "Deleted file, content still referenced");
            return Ok(DeleteOutcome {
                file,
                blob_deleted: false,
            });
        }

        let blob_deleted = match self.storage.delete(&file.content_key).await {
            Ok(()) => {
                metrics::BLOBS_DELETED.inc();
                true
            }
            Err(e) if e.is_not_found() => true,
            Err(e) => {
                error!(
                    content_key = %file.content_key,
                    error = %e,
                    "Failed to delete unreferenced blob"
                );
                false
            }
        };

        info!(content_key = %file.content_key, blob_deleted, "Deleted file");
        Ok(DeleteOutcome { file, blob_deleted })
    }
}
