//! Resumable upload session repository.

use crate::error::MetadataResult;
use crate::models::{FileRow, MergeClaim, PartFileRow};
use async_trait::async_trait;
use depot_core::{PartFileStatus, SessionId};
use time::OffsetDateTime;

/// Repository for part file (resumable upload session) operations.
#[async_trait]
pub trait PartFileRepo: Send + Sync {
    /// Create a new part file.
    async fn create_part_file(&self, part_file: &PartFileRow) -> MetadataResult<()>;

    /// Get a part file by session ID.
    async fn get_part_file(&self, session_id: SessionId) -> MetadataResult<Option<PartFileRow>>;

    /// Atomically claim the merge of a session.
    ///
    /// A session in 'uploading' or 'error' is moved to 'merging'. A session
    /// already 'merging' is taken over only when its `updated_at` is older
    /// than `stale_before`, which recovers merges abandoned by a crash.
    /// Returns None if the session doesn't exist.
    async fn begin_merge(
        &self,
        session_id: SessionId,
        updated_at: OffsetDateTime,
        stale_before: OffsetDateTime,
    ) -> MetadataResult<Option<MergeClaim>>;

    /// Unconditionally set a session's status.
    async fn set_part_file_status(
        &self,
        session_id: SessionId,
        status: PartFileStatus,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Record the merged file and mark the session complete in one transaction.
    ///
    /// Fails with `InvalidStateTransition` unless the session is 'merging'.
    async fn complete_part_file(
        &self,
        session_id: SessionId,
        file: &FileRow,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;
}
