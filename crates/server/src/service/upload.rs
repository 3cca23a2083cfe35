//! Single-shot upload with (hash, size) dedup.

use super::{FileService, new_logical_file};
use crate::error::ApiResult;
use crate::metrics;
use bytes::Bytes;
use depot_core::{ContentHash, ContentKey, FileId, LogicalFile};
use depot_metadata::repos::FileRepo;
use depot_storage::{StorageError, StorageResult, save_stream};
use futures::Stream;
use tracing::{info, instrument, warn};

/// Parameters of a single-shot upload.
#[derive(Clone, Debug)]
pub struct SingleUpload {
    pub name: String,
    /// Hash asserted by the client, if any.
    pub declared_hash: Option<ContentHash>,
    /// Size asserted by the client, if any.
    pub declared_size: Option<u64>,
    pub uploader_id: i64,
}

impl FileService {
    /// Store one file in a single request.
    ///
    /// When both hash and size are declared and matching content already
    /// exists, a new logical file is recorded against it and `body` is never
    /// polled.
    #[instrument(
        skip_all,
        fields(name = %upload.name, uploader_id = upload.uploader_id)
    )]
    pub async fn upload<S>(&self, upload: SingleUpload, body: S) -> ApiResult<LogicalFile>
    where
        S: Stream<Item = StorageResult<Bytes>> + Unpin + Send,
    {
        if let (Some(hash), Some(size)) = (upload.declared_hash, upload.declared_size)
            && let Some(content_key) = self
                .metadata
                .find_content_by_hash_and_size(&hash, size)
                .await?
        {
            let file = new_logical_file(
                FileId::new(),
                &upload.name,
                size,
                hash,
                content_key,
                upload.uploader_id,
            );
            self.record_file(&file).await?;

            metrics::FILES_DEDUPLICATED.inc();
            metrics::BYTES_DEDUPLICATED.inc_by(size);
            info!(
                file_id = %file.id,
                content_key = %file.content_key,
                hash = %hash,
                size,
                "Upload satisfied by existing content"
            );
            return Ok(file);
        }

        let content_key = ContentKey::generate();
        let saved = match save_stream(
            self.storage.as_ref(),
            &content_key,
            body,
            Some(self.limits.max_upload_size),
        )
        .await
        {
            Ok(saved) => saved,
            Err(e) => {
                let kind = match e {
                    StorageError::TooLarge { .. } => "too_large",
                    _ => "storage",
                };
                metrics::record_upload_error(kind);
                return Err(e.into());
            }
        };

        if let Some(expected) = upload.declared_hash
            && expected != saved.hash
        {
            metrics::UPLOAD_HASH_MISMATCHES.inc();
            warn!(
                content_key = %content_key,
                expected = %expected,
                actual = %saved.hash,
                "Upload hash mismatch, recording computed hash"
            );
        }
        if let Some(expected) = upload.declared_size
            && expected != saved.size
        {
            warn!(
                content_key = %content_key,
                expected,
                actual = saved.size,
                "Upload size mismatch, recording actual size"
            );
        }

        let file = new_logical_file(
            FileId::new(),
            &upload.name,
            saved.size,
            saved.hash,
            content_key,
            upload.uploader_id,
        );
        if let Err(e) = self.record_file(&file).await {
            metrics::record_upload_error("metadata");
            self.discard_blob(&file.content_key).await;
            return Err(e);
        }

        metrics::FILES_UPLOADED.inc();
        metrics::BYTES_UPLOADED.inc_by(saved.size);
        info!(
            file_id = %file.id,
            content_key = %file.content_key,
            hash = %file.hash,
            size = file.size,
            "Stored uploaded file"
        );
        Ok(file)
    }
}
