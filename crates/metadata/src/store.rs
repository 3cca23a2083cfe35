//! Metadata store trait and implementations.

use crate::error::MetadataResult;
use crate::repos::{ChunkRepo, FileRepo, PartFileRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default busy timeout while waiting on a locked database.
const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 30;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FileRepo + PartFileRepo + ChunkRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let busy_timeout = query_timeout_secs.unwrap_or(DEFAULT_BUSY_TIMEOUT_SECS);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(busy_timeout));

        let pool = SqlitePoolOptions::new()
            // A single connection serializes writers and avoids "database is locked"
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), busy_timeout, "Opened SQLite metadata store");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::error::MetadataError;
    use crate::models::*;
    use depot_core::{ContentHash, ContentKey, FileId, PartFileStatus, SessionId};
    use time::OffsetDateTime;

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn find_content_by_hash_and_size(
            &self,
            hash: &ContentHash,
            size: u64,
        ) -> MetadataResult<Option<ContentKey>> {
            let key: Option<String> = sqlx::query_scalar(
                "SELECT content_key FROM files WHERE hash = ? AND size = ? AND is_dir = 0 LIMIT 1",
            )
            .bind(hash.to_hex())
            .bind(to_db_int(size, "size")?)
            .fetch_optional(&self.pool)
            .await?;

            key.map(|k| ContentKey::parse(&k).map_err(|e| MetadataError::Corrupt(e.to_string())))
                .transpose()
        }

        async fn create_file(&self, file: &FileRow) -> MetadataResult<()> {
            insert_file(&self.pool, file).await
        }

        async fn get_file(&self, file_id: FileId) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE file_id = ?")
                .bind(*file_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn delete_file(&self, file_id: FileId) -> MetadataResult<Option<FileRow>> {
            let row =
                sqlx::query_as::<_, FileRow>("DELETE FROM files WHERE file_id = ? RETURNING *")
                    .bind(*file_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn count_files_by_content_key(
            &self,
            content_key: &ContentKey,
        ) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE content_key = ?")
                .bind(content_key.as_str())
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }
    }

    async fn insert_file<'e, E>(executor: E, file: &FileRow) -> MetadataResult<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO files (
                file_id, name, extension, size, hash, content_key,
                is_dir, uploader_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(file.file_id)
        .bind(&file.name)
        .bind(&file.extension)
        .bind(file.size)
        .bind(&file.hash)
        .bind(&file.content_key)
        .bind(file.is_dir)
        .bind(file.uploader_id)
        .bind(file.created_at)
        .execute(executor)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                MetadataError::AlreadyExists(format!("file {}", file.file_id.simple()))
            }
            other => MetadataError::Database(other),
        })?;
        Ok(())
    }

    #[async_trait]
    impl PartFileRepo for SqliteStore {
        async fn create_part_file(&self, part_file: &PartFileRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO part_files (
                    session_id, name, extension, size, hash, chunk_size, total_chunks,
                    status, uploader_id, content_key, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(part_file.session_id)
            .bind(&part_file.name)
            .bind(&part_file.extension)
            .bind(part_file.size)
            .bind(&part_file.hash)
            .bind(part_file.chunk_size)
            .bind(part_file.total_chunks)
            .bind(&part_file.status)
            .bind(part_file.uploader_id)
            .bind(&part_file.content_key)
            .bind(part_file.created_at)
            .bind(part_file.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_part_file(
            &self,
            session_id: SessionId,
        ) -> MetadataResult<Option<PartFileRow>> {
            let row =
                sqlx::query_as::<_, PartFileRow>("SELECT * FROM part_files WHERE session_id = ?")
                    .bind(*session_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn begin_merge(
            &self,
            session_id: SessionId,
            updated_at: OffsetDateTime,
            stale_before: OffsetDateTime,
        ) -> MetadataResult<Option<MergeClaim>> {
            // The UPDATE takes SQLite's write lock, so only one caller can win the transition.
            let mut tx = self.pool.begin().await?;

            let Some(mut session) =
                sqlx::query_as::<_, PartFileRow>("SELECT * FROM part_files WHERE session_id = ?")
                    .bind(*session_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?
            else {
                tx.commit().await?;
                return Ok(None);
            };

            let from = match session.status()? {
                status @ (PartFileStatus::Init | PartFileStatus::Uploading | PartFileStatus::Error) => {
                    Some(status)
                }
                PartFileStatus::Merging if session.updated_at < stale_before => {
                    tracing::warn!(
                        session_id = %session_id,
                        since = %session.updated_at,
                        "Taking over stale merge"
                    );
                    Some(PartFileStatus::Merging)
                }
                _ => None,
            };

            let mut acquired = false;
            if let Some(from) = from {
                let result = sqlx::query(
                    "UPDATE part_files SET status = ?, updated_at = ? \
                     WHERE session_id = ? AND status = ?",
                )
                .bind(PartFileStatus::Merging.as_str())
                .bind(updated_at)
                .bind(*session_id.as_uuid())
                .bind(from.as_str())
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() > 0 {
                    session.status = PartFileStatus::Merging.as_str().to_string();
                    session.updated_at = updated_at;
                    acquired = true;
                }
            }

            tx.commit().await?;
            Ok(Some(MergeClaim { session, acquired }))
        }

        async fn set_part_file_status(
            &self,
            session_id: SessionId,
            status: PartFileStatus,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result =
                sqlx::query("UPDATE part_files SET status = ?, updated_at = ? WHERE session_id = ?")
                    .bind(status.as_str())
                    .bind(updated_at)
                    .bind(*session_id.as_uuid())
                    .execute(&self.pool)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("part file {session_id}")));
            }
            Ok(())
        }

        async fn complete_part_file(
            &self,
            session_id: SessionId,
            file: &FileRow,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let result = sqlx::query(
                "UPDATE part_files SET status = ?, content_key = ?, updated_at = ? \
                 WHERE session_id = ? AND status = ?",
            )
            .bind(PartFileStatus::Complete.as_str())
            .bind(&file.content_key)
            .bind(updated_at)
            .bind(*session_id.as_uuid())
            .bind(PartFileStatus::Merging.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let current: Option<String> =
                    sqlx::query_scalar("SELECT status FROM part_files WHERE session_id = ?")
                        .bind(*session_id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(match current {
                    Some(from) => MetadataError::InvalidStateTransition {
                        from,
                        to: PartFileStatus::Complete.as_str().to_string(),
                    },
                    None => MetadataError::NotFound(format!("part file {session_id}")),
                });
            }

            insert_file(&mut *tx, file).await?;
            tx.commit().await?;
            Ok(())
        }
    }

    #[async_trait]
    impl ChunkRepo for SqliteStore {
        async fn get_chunk(
            &self,
            session_id: SessionId,
            chunk_index: u64,
        ) -> MetadataResult<Option<PartFileChunkRow>> {
            let row = sqlx::query_as::<_, PartFileChunkRow>(
                "SELECT * FROM part_file_chunks WHERE session_id = ? AND chunk_index = ?",
            )
            .bind(*session_id.as_uuid())
            .bind(to_db_int(chunk_index, "chunk_index")?)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn upsert_chunk(&self, chunk: &PartFileChunkRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO part_file_chunks (session_id, chunk_index, hash, size, content_key, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(session_id, chunk_index) DO UPDATE SET
                    hash = excluded.hash,
                    size = excluded.size,
                    content_key = excluded.content_key,
                    created_at = excluded.created_at
                "#,
            )
            .bind(chunk.session_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.hash)
            .bind(chunk.size)
            .bind(&chunk.content_key)
            .bind(chunk.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_chunks(
            &self,
            session_id: SessionId,
        ) -> MetadataResult<Vec<PartFileChunkRow>> {
            let rows = sqlx::query_as::<_, PartFileChunkRow>(
                "SELECT * FROM part_file_chunks WHERE session_id = ? ORDER BY chunk_index",
            )
            .bind(*session_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_chunks(&self, session_id: SessionId) -> MetadataResult<u64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM part_file_chunks WHERE session_id = ?")
                    .bind(*session_id.as_uuid())
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as u64)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Logical files; several rows may share one content_key
CREATE TABLE IF NOT EXISTS files (
    file_id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    extension TEXT NOT NULL DEFAULT '',
    size INTEGER NOT NULL,
    hash TEXT NOT NULL,
    content_key TEXT NOT NULL,
    is_dir INTEGER NOT NULL DEFAULT 0,
    uploader_id INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_hash_size ON files(hash, size);
CREATE INDEX IF NOT EXISTS idx_files_content_key ON files(content_key);

-- Resumable upload sessions
CREATE TABLE IF NOT EXISTS part_files (
    session_id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    extension TEXT NOT NULL DEFAULT '',
    size INTEGER NOT NULL,
    hash TEXT NOT NULL,
    chunk_size INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('init', 'uploading', 'merging', 'complete', 'error')),
    uploader_id INTEGER NOT NULL DEFAULT 0,
    content_key TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_part_files_status ON part_files(status);

-- Chunks received for a session
CREATE TABLE IF NOT EXISTS part_file_chunks (
    session_id BLOB NOT NULL REFERENCES part_files(session_id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    hash TEXT NOT NULL,
    size INTEGER NOT NULL,
    content_key TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (session_id, chunk_index)
);
"#;
