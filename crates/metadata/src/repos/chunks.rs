//! Part file chunk repository.

use crate::error::MetadataResult;
use crate::models::PartFileChunkRow;
use async_trait::async_trait;
use depot_core::SessionId;

/// Repository for chunk records of resumable uploads.
#[async_trait]
pub trait ChunkRepo: Send + Sync {
    /// Get the chunk stored at an index.
    async fn get_chunk(
        &self,
        session_id: SessionId,
        chunk_index: u64,
    ) -> MetadataResult<Option<PartFileChunkRow>>;

    /// Create or replace the chunk at `(session_id, chunk_index)`.
    async fn upsert_chunk(&self, chunk: &PartFileChunkRow) -> MetadataResult<()>;

    /// List all chunks of a session ordered by index.
    async fn list_chunks(&self, session_id: SessionId) -> MetadataResult<Vec<PartFileChunkRow>>;

    /// Count chunks received for a session.
    async fn count_chunks(&self, session_id: SessionId) -> MetadataResult<u64>;
}
