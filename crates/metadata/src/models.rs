//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use depot_core::{ContentHash, ContentKey, FileId, LogicalFile, PartFileStatus};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Convert an unsigned domain value into the signed column type.
pub fn to_db_int(value: u64, field: &str) -> MetadataResult<i64> {
    i64::try_from(value).map_err(|_| MetadataError::OutOfRange(format!("{field}={value}")))
}

fn from_db_int(value: i64, field: &str) -> MetadataResult<u64> {
    u64::try_from(value).map_err(|_| MetadataError::Corrupt(format!("negative {field}: {value}")))
}

fn parse_hash(value: &str) -> MetadataResult<ContentHash> {
    ContentHash::from_hex(value).map_err(|e| MetadataError::Corrupt(e.to_string()))
}

fn parse_key(value: &str) -> MetadataResult<ContentKey> {
    ContentKey::parse(value).map_err(|e| MetadataError::Corrupt(e.to_string()))
}

// =============================================================================
// Logical files
// =============================================================================

/// Logical file record.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub file_id: Uuid,
    pub name: String,
    pub extension: String,
    pub size: i64,
    pub hash: String,
    pub content_key: String,
    pub is_dir: bool,
    pub uploader_id: i64,
    pub created_at: OffsetDateTime,
}

impl FileRow {
    pub fn from_file(file: &LogicalFile) -> MetadataResult<Self> {
        Ok(Self {
            file_id: *file.id.as_uuid(),
            name: file.name.clone(),
            extension: file.extension.clone(),
            size: to_db_int(file.size, "size")?,
            hash: file.hash.to_hex(),
            content_key: file.content_key.as_str().to_string(),
            is_dir: file.is_dir,
            uploader_id: file.uploader_id,
            created_at: file.created_at,
        })
    }

    pub fn into_file(self) -> MetadataResult<LogicalFile> {
        Ok(LogicalFile {
            id: FileId::from_uuid(self.file_id),
            size: from_db_int(self.size, "size")?,
            hash: parse_hash(&self.hash)?,
            content_key: parse_key(&self.content_key)?,
            name: self.name,
            extension: self.extension,
            is_dir: self.is_dir,
            uploader_id: self.uploader_id,
            created_at: self.created_at,
        })
    }
}

// =============================================================================
// Resumable upload sessions
// =============================================================================

/// Part file (resumable upload session) record.
#[derive(Debug, Clone, FromRow)]
pub struct PartFileRow {
    pub session_id: Uuid,
    pub name: String,
    pub extension: String,
    pub size: i64,
    pub hash: String,
    pub chunk_size: i64,
    pub total_chunks: i64,
    pub status: String,
    pub uploader_id: i64,
    /// Set once the merged blob exists.
    pub content_key: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PartFileRow {
    pub fn status(&self) -> MetadataResult<PartFileStatus> {
        self.status
            .parse()
            .map_err(|e: depot_core::Error| MetadataError::Corrupt(e.to_string()))
    }

    pub fn declared_size(&self) -> MetadataResult<u64> {
        from_db_int(self.size, "size")
    }

    pub fn declared_hash(&self) -> MetadataResult<ContentHash> {
        parse_hash(&self.hash)
    }

    pub fn chunk_size(&self) -> MetadataResult<u64> {
        from_db_int(self.chunk_size, "chunk_size")
    }

    pub fn total_chunks(&self) -> MetadataResult<u64> {
        from_db_int(self.total_chunks, "total_chunks")
    }
}

/// Outcome of [`PartFileRepo::begin_merge`](crate::repos::PartFileRepo::begin_merge).
#[derive(Debug, Clone)]
pub struct MergeClaim {
    /// The session as it stands after the call.
    pub session: PartFileRow,
    /// True when this call moved the session to 'merging' and now owns the merge.
    pub acquired: bool,
}

/// Chunk record belonging to a part file.
#[derive(Debug, Clone, FromRow)]
pub struct PartFileChunkRow {
    pub session_id: Uuid,
    pub chunk_index: i64,
    pub hash: String,
    pub size: i64,
    pub content_key: String,
    pub created_at: OffsetDateTime,
}

impl PartFileChunkRow {
    pub fn index(&self) -> MetadataResult<u64> {
        from_db_int(self.chunk_index, "chunk_index")
    }

    pub fn chunk_hash(&self) -> MetadataResult<ContentHash> {
        parse_hash(&self.hash)
    }

    pub fn content_key(&self) -> MetadataResult<ContentKey> {
        parse_key(&self.content_key)
    }
}
