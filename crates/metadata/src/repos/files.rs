//! Logical file repository.

use crate::error::MetadataResult;
use crate::models::FileRow;
use async_trait::async_trait;
use depot_core::{ContentHash, ContentKey, FileId};

/// Repository for logical file records and content dedup lookups.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Find the content key of any file with this exact hash and size.
    async fn find_content_by_hash_and_size(
        &self,
        hash: &ContentHash,
        size: u64,
    ) -> MetadataResult<Option<ContentKey>>;

    /// Insert a new logical file. Always creates a new row.
    async fn create_file(&self, file: &FileRow) -> MetadataResult<()>;

    /// Get a logical file by ID.
    async fn get_file(&self, file_id: FileId) -> MetadataResult<Option<FileRow>>;

    /// Delete a logical file, returning the removed row.
    async fn delete_file(&self, file_id: FileId) -> MetadataResult<Option<FileRow>>;

    /// Count logical files that reference a content key.
    async fn count_files_by_content_key(&self, content_key: &ContentKey) -> MetadataResult<u64>;
}
