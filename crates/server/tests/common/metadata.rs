//! Metadata store test utilities.

use depot_core::{ContentHash, ContentKey, FileId, LogicalFile, PartFileStatus, SessionId};
use depot_metadata::{FileRow, MetadataResult, MetadataStore, PartFileChunkRow, PartFileRow, SqliteStore};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;

/// A test metadata store wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    sqlite_store: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestMetadata {
    /// Create a new SQLite store in a temporary directory.
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let store = Arc::new(SqliteStore::new(&db_path, None).await?);

        Ok(Self {
            store: store.clone(),
            sqlite_store: store,
            _temp_dir: temp_dir,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    /// Get the SQLite connection pool for raw queries.
    pub fn pool(&self) -> &Pool<Sqlite> {
        self.sqlite_store.pool()
    }
}

/// Build a logical file row for `data` stored under `content_key`.
#[allow(dead_code)]
pub fn file_row(name: &str, data: &[u8], content_key: &ContentKey) -> FileRow {
    let file = LogicalFile {
        id: FileId::new(),
        name: name.to_string(),
        extension: depot_core::file_extension(name),
        size: data.len() as u64,
        hash: ContentHash::compute(data),
        content_key: content_key.clone(),
        is_dir: false,
        uploader_id: 0,
        created_at: OffsetDateTime::now_utc(),
    };
    FileRow::from_file(&file).expect("file row")
}

/// Build an `uploading` session row.
#[allow(dead_code)]
pub fn part_file_row(session_id: SessionId, size: u64, chunk_size: u64) -> PartFileRow {
    let now = OffsetDateTime::now_utc();
    PartFileRow {
        session_id: *session_id.as_uuid(),
        name: "upload.bin".to_string(),
        extension: ".bin".to_string(),
        size: size as i64,
        hash: ContentHash::compute(b"declared").to_hex(),
        chunk_size: chunk_size as i64,
        total_chunks: depot_core::upload::expected_chunk_count(size, chunk_size) as i64,
        status: PartFileStatus::Uploading.as_str().to_string(),
        uploader_id: 0,
        content_key: None,
        created_at: now,
        updated_at: now,
    }
}

/// Build a chunk row for `data` at `index`.
#[allow(dead_code)]
pub fn chunk_row(session_id: SessionId, index: u64, data: &[u8]) -> PartFileChunkRow {
    PartFileChunkRow {
        session_id: *session_id.as_uuid(),
        chunk_index: index as i64,
        hash: ContentHash::compute(data).to_hex(),
        size: data.len() as i64,
        content_key: ContentKey::generate().as_str().to_string(),
        created_at: OffsetDateTime::now_utc(),
    }
}
