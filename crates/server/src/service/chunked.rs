//! Resumable chunked uploads: init, per-chunk upload and complete.

use super::{FileService, new_logical_file};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use bytes::Bytes;
use depot_core::upload::{
    ChunkUploadResponse, CompleteUploadResponse, InitUploadRequest, InitUploadResponse,
    PartFileSession, expected_chunk_count, expected_chunk_len, validate_chunk_size,
};
use depot_core::{
    ContentHash, ContentKey, FileId, LogicalFile, PartFileStatus, SessionId, UploadState,
    file_extension,
};
use depot_metadata::models::to_db_int;
use depot_metadata::repos::{ChunkRepo, FileRepo, PartFileRepo};
use depot_metadata::{FileRow, PartFileChunkRow, PartFileRow};
use depot_storage::{StorageError, StorageResult, concat_blobs, save_stream};
use futures::Stream;
use std::collections::BTreeSet;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{Instrument, debug, error, info, instrument, warn};

impl FileService {
    /// Start a resumable upload, or finish at once when the content exists.
    #[instrument(
        skip_all,
        fields(name = %req.filename, hash = %req.hash, size = req.size, uploader_id = uploader_id)
    )]
    pub async fn init_upload(
        &self,
        req: InitUploadRequest,
        uploader_id: i64,
    ) -> ApiResult<InitUploadResponse> {
        if let Some(content_key) = self
            .metadata
            .find_content_by_hash_and_size(&req.hash, req.size)
            .await?
        {
            let file = new_logical_file(
                FileId::new(),
                &req.filename,
                req.size,
                req.hash,
                content_key,
                uploader_id,
            );
            self.record_file(&file).await?;

            metrics::FILES_DEDUPLICATED.inc();
            metrics::BYTES_DEDUPLICATED.inc_by(req.size);
            info!(file_id = %file.id, content_key = %file.content_key, "Upload init satisfied by existing content");
            return Ok(InitUploadResponse {
                state: UploadState::Complete,
                file: Some(file),
                part_file_session: None,
            });
        }

        let chunk_size = req.chunk_size.unwrap_or(self.limits.default_chunk_size);
        validate_chunk_size(
            chunk_size,
            self.limits.min_chunk_size,
            self.limits.max_chunk_size,
        )?;
        let total_chunks = expected_chunk_count(req.size, chunk_size);

        let session_id = SessionId::new();
        let now = OffsetDateTime::now_utc();
        let row = PartFileRow {
            session_id: *session_id.as_uuid(),
            extension: file_extension(&req.filename),
            name: req.filename.clone(),
            size: to_db_int(req.size, "size")?,
            hash: req.hash.to_hex(),
            chunk_size: to_db_int(chunk_size, "chunk_size")?,
            total_chunks: to_db_int(total_chunks, "total_chunks")?,
            status: PartFileStatus::Uploading.as_str().to_string(),
            uploader_id,
            content_key: None,
            created_at: now,
            updated_at: now,
        };
        self.metadata.create_part_file(&row).await?;

        metrics::UPLOAD_SESSIONS_CREATED.inc();
        info!(session_id = %session_id, chunk_size, total_chunks, "Created upload session");

        Ok(InitUploadResponse {
            state: UploadState::Uploading,
            file: None,
            part_file_session: Some(PartFileSession {
                session_id,
                name: req.filename,
                size: req.size,
                hash: req.hash,
                chunk_size,
                total_chunks,
                status: PartFileStatus::Uploading,
                uploaded_chunks: Vec::new(),
            }),
        })
    }

    /// Store one chunk of a session.
    ///
    /// The chunk must be exactly the length its index implies. A chunk whose
    /// declared hash and length match the stored record is acknowledged as
    /// deduplicated without touching the blob store; a different one replaces
    /// the previous record.
    #[instrument(skip_all, fields(session_id = %session_id, chunk_index = chunk_index))]
    pub async fn upload_chunk<S>(
        &self,
        session_id: SessionId,
        chunk_index: u64,
        declared_hash: ContentHash,
        body: S,
    ) -> ApiResult<ChunkUploadResponse>
    where
        S: Stream<Item = StorageResult<Bytes>> + Unpin + Send,
    {
        let started = Instant::now();
        let session = self
            .metadata
            .get_part_file(session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("upload session {session_id}")))?;

        let status = session.status()?;
        if !status.accepts_chunks() {
            return Err(ApiError::Conflict(format!(
                "upload session {session_id} is {status}"
            )));
        }

        let total_chunks = session.total_chunks()?;
        let expected_len = expected_chunk_len(
            session.declared_size()?,
            session.chunk_size()?,
            chunk_index,
        )
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "chunk index {chunk_index} out of range (total {total_chunks})"
            ))
        })?;

        let existing = self.metadata.get_chunk(session_id, chunk_index).await?;
        if let Some(ref existing) = existing
            && existing.hash == declared_hash.to_hex()
            && existing.size == to_db_int(expected_len, "size")?
        {
            metrics::CHUNKS_DEDUPLICATED.inc();
            debug!("Chunk already stored");
            return Ok(ChunkUploadResponse {
                session_id,
                chunk_index,
                size: expected_len,
                hash: declared_hash,
                deduplicated: true,
            });
        }

        let content_key = ContentKey::generate();
        let saved = match save_stream(
            self.storage.as_ref(),
            &content_key,
            body,
            Some(expected_len),
        )
        .await
        {
            Ok(saved) => saved,
            Err(StorageError::TooLarge { .. }) => {
                return Err(ApiError::BadRequest(format!(
                    "chunk {chunk_index} exceeds its expected length of {expected_len} bytes"
                )));
            }
            Err(e) => {
                metrics::record_upload_error("chunk_storage");
                return Err(e.into());
            }
        };

        if saved.size != expected_len {
            self.discard_blob(&content_key).await;
            return Err(ApiError::BadRequest(format!(
                "chunk {chunk_index} is {} bytes, expected {expected_len}",
                saved.size
            )));
        }

        if declared_hash != saved.hash {
            self.discard_blob(&content_key).await;
            metrics::CHUNK_HASH_MISMATCHES.inc();
            warn!(expected = %declared_hash, actual = %saved.hash, "Chunk hash mismatch");
            return Err(ApiError::HashMismatch {
                expected: declared_hash.to_hex(),
                actual: saved.hash.to_hex(),
            });
        }

        let row = PartFileChunkRow {
            session_id: *session_id.as_uuid(),
            chunk_index: to_db_int(chunk_index, "chunk_index")?,
            hash: saved.hash.to_hex(),
            size: to_db_int(saved.size, "size")?,
            content_key: content_key.as_str().to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        if let Err(e) = self.metadata.upsert_chunk(&row).await {
            self.discard_blob(&content_key).await;
            return Err(e.into());
        }

        if let Some(replaced) = existing {
            match replaced.content_key() {
                Ok(old_key) => self.discard_blob(&old_key).await,
                Err(e) => warn!(error = %e, "Replaced chunk has an unreadable content key"),
            }
        }

        metrics::CHUNKS_UPLOADED.inc();
        metrics::BYTES_UPLOADED.inc_by(saved.size);
        debug!(
            content_key = %content_key,
            size = saved.size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stored chunk"
        );

        Ok(ChunkUploadResponse {
            session_id,
            chunk_index,
            size: saved.size,
            hash: saved.hash,
            deduplicated: false,
        })
    }

    /// Merge a session's chunks into a logical file.
    ///
    /// Missing chunks are reported with `state: uploading` rather than an
    /// error. Only the caller that claims the session performs the merge, and
    /// it runs on its own task so a dropped request cannot strand the session
    /// in `merging`.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn complete_upload(&self, session_id: SessionId) -> ApiResult<CompleteUploadResponse> {
        let session = self
            .metadata
            .get_part_file(session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("upload session {session_id}")))?;

        if session.status()? == PartFileStatus::Complete {
            return self.completed(session_id).await;
        }

        let total_chunks = session.total_chunks()?;
        let chunks = self.metadata.list_chunks(session_id).await?;
        let received: BTreeSet<u64> = chunks
            .iter()
            .map(|c| c.index())
            .collect::<Result<_, _>>()?;
        let missing: Vec<u64> = (0..total_chunks)
            .filter(|i| !received.contains(i))
            .collect();
        if !missing.is_empty() {
            debug!(missing = missing.len(), "Upload incomplete");
            return Ok(still_uploading(missing));
        }

        let now = OffsetDateTime::now_utc();
        let stale_before = now
            .checked_sub(self.limits.merge_stale_after)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let Some(claim) = self
            .metadata
            .begin_merge(session_id, now, stale_before)
            .await?
        else {
            return Err(ApiError::NotFound(format!("upload session {session_id}")));
        };
        let session = claim.session;
        if !claim.acquired {
            if session.status()? == PartFileStatus::Complete {
                return self.completed(session_id).await;
            }
            // Another caller owns the merge
            return Ok(still_uploading(Vec::new()));
        }

        // Chunks listed before begin_merge may have been replaced since
        let chunks = self.metadata.list_chunks(session_id).await?;
        let parts: Vec<ContentKey> = chunks
            .iter()
            .filter(|c| c.chunk_index < session.total_chunks)
            .map(|c| c.content_key())
            .collect::<Result<_, _>>()?;

        let service = self.clone();
        let task = tokio::spawn(
            async move { service.finish_merge(session, session_id, parts).await }
                .in_current_span(),
        );
        task.await
            .map_err(|e| ApiError::Internal(format!("merge task failed: {e}")))?
    }

    /// Merge the claimed session and settle its status either way.
    async fn finish_merge(
        &self,
        session: PartFileRow,
        session_id: SessionId,
        parts: Vec<ContentKey>,
    ) -> ApiResult<CompleteUploadResponse> {
        match self.merge(&session, session_id, &parts).await {
            Ok(file) => {
                for key in &parts {
                    self.discard_blob(key).await;
                }
                metrics::UPLOAD_SESSIONS_COMPLETED.inc();
                info!(
                    file_id = %file.id,
                    content_key = %file.content_key,
                    hash = %file.hash,
                    size = file.size,
                    "Merged upload session"
                );
                Ok(CompleteUploadResponse {
                    state: UploadState::Complete,
                    file: Some(file),
                    missing_chunks: Vec::new(),
                })
            }
            Err(e) => {
                metrics::record_upload_error("merge");
                error!(error = %e, "Merge failed");
                self.mark_merge_failed(session_id).await;
                Err(e)
            }
        }
    }

    async fn merge(
        &self,
        session: &PartFileRow,
        session_id: SessionId,
        parts: &[ContentKey],
    ) -> ApiResult<LogicalFile> {
        let timer = metrics::MERGE_DURATION.start_timer();
        let dest = ContentKey::generate();
        let merged = concat_blobs(self.storage.as_ref(), parts, &dest).await?;

        let declared_size = session.declared_size()?;
        if merged.size != declared_size {
            self.discard_blob(&dest).await;
            return Err(ApiError::Internal(format!(
                "merged {} bytes, expected {declared_size}",
                merged.size
            )));
        }

        let declared_hash = session.declared_hash()?;
        if declared_hash != merged.hash {
            metrics::UPLOAD_HASH_MISMATCHES.inc();
            warn!(
                expected = %declared_hash,
                actual = %merged.hash,
                "Merged file hash mismatch, recording computed hash"
            );
        }

        let file = new_logical_file(
            FileId::from_uuid(*session_id.as_uuid()),
            &session.name,
            merged.size,
            merged.hash,
            dest,
            session.uploader_id,
        );
        let row = FileRow::from_file(&file)?;
        if let Err(e) = self
            .metadata
            .complete_part_file(session_id, &row, OffsetDateTime::now_utc())
            .await
        {
            self.discard_blob(&file.content_key).await;
            return Err(e.into());
        }

        timer.observe_duration();
        Ok(file)
    }

    /// Move a failed merge to 'error' unless a takeover already finished it.
    async fn mark_merge_failed(&self, session_id: SessionId) {
        match self.metadata.get_part_file(session_id).await {
            Ok(Some(row)) if row.status == PartFileStatus::Merging.as_str() => {}
            Ok(_) => return,
            Err(e) => {
                error!(error = %e, "Failed to reload session after merge failure");
                return;
            }
        }
        if let Err(e) = self
            .metadata
            .set_part_file_status(session_id, PartFileStatus::Error, OffsetDateTime::now_utc())
            .await
        {
            error!(error = %e, "Failed to mark session as errored");
        }
    }

    /// Response for a session that already produced its file.
    async fn completed(&self, session_id: SessionId) -> ApiResult<CompleteUploadResponse> {
        let file = self.get_file(FileId::from_uuid(*session_id.as_uuid())).await?;
        Ok(CompleteUploadResponse {
            state: UploadState::Complete,
            file: Some(file),
            missing_chunks: Vec::new(),
        })
    }
}

fn still_uploading(missing_chunks: Vec<u64>) -> CompleteUploadResponse {
    CompleteUploadResponse {
        state: UploadState::Uploading,
        file: None,
        missing_chunks,
    }
}
