//! Local filesystem storage backend.
//!
//! Blobs live at `root/XX/YY/<key>`, where `XX` and `YY` are the two bytes of
//! the CRC-16/ARC checksum of the key rendered as lowercase hex. Writes go to
//! a uniquely named temp file next to the final path and are renamed into
//! place after an fsync.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobMeta, BlobReader, BlobStore, ByteStream, StreamingUpload, check_window};
use async_trait::async_trait;
use bytes::Bytes;
use crc::{CRC_16_ARC, Crc};
use depot_core::ContentKey;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

const SHARD_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// Relative shard path for a key: `XX/YY/<key>`.
pub fn shard_path(key: &ContentKey) -> PathBuf {
    let [hi, lo] = SHARD_CRC.checksum(key.as_str().as_bytes()).to_be_bytes();
    PathBuf::from(format!("{hi:02x}"))
        .join(format!("{lo:02x}"))
        .join(key.as_str())
}

fn map_not_found(err: std::io::Error, key: &ContentKey) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(err)
    }
}

/// Local filesystem blob store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Absolute path of the blob stored under `key`.
    pub fn blob_path(&self, key: &ContentKey) -> PathBuf {
        self.root.join(shard_path(key))
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &ContentKey) -> StorageResult<bool> {
        fs::try_exists(self.blob_path(key))
            .await
            .map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &ContentKey) -> StorageResult<BlobMeta> {
        let metadata = fs::metadata(self.blob_path(key))
            .await
            .map_err(|e| map_not_found(e, key))?;
        Ok(BlobMeta {
            size: metadata.len(),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn open(&self, key: &ContentKey) -> StorageResult<Box<dyn BlobReader>> {
        let file = fs::File::open(self.blob_path(key))
            .await
            .map_err(|e| map_not_found(e, key))?;
        let size = file.metadata().await?.len();
        Ok(Box::new(FilesystemReader { file, size }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn put_stream(&self, key: &ContentKey) -> StorageResult<Box<dyn StreamingUpload>> {
        let path = self.blob_path(key);
        self.ensure_parent(&path).await?;

        // Unique temp name so concurrent writers never share a file
        let temp_path = path.with_file_name(format!("{}.tmp.{}", key, Uuid::new_v4().simple()));
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(FilesystemUpload {
            file,
            temp_path,
            final_path: path,
            bytes_written: 0,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &ContentKey) -> StorageResult<()> {
        fs::remove_file(self.blob_path(key))
            .await
            .map_err(|e| map_not_found(e, key))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

/// Open file handle with its size captured at open time.
struct FilesystemReader {
    file: fs::File,
    size: u64,
}

#[async_trait]
impl BlobReader for FilesystemReader {
    fn size(&self) -> u64 {
        self.size
    }

    async fn stream_range(mut self: Box<Self>, start: u64, len: u64) -> StorageResult<ByteStream> {
        check_window(start, len, self.size)?;
        self.file.seek(std::io::SeekFrom::Start(start)).await?;
        let limited = self.file.take(len);
        let stream = ReaderStream::with_capacity(limited, STREAM_CHUNK_SIZE)
            .map(|chunk| chunk.map_err(StorageError::Io));
        Ok(Box::pin(stream))
    }
}

/// Streaming upload for filesystem backend.
struct FilesystemUpload {
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let FilesystemUpload {
            file,
            temp_path,
            final_path,
            bytes_written,
        } = *self;

        let synced = file.sync_all().await;
        drop(file);
        if let Err(e) = synced {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(bytes_written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        drop(self.file);
        match fs::remove_file(&self.temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
