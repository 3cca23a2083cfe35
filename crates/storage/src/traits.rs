//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::ContentKey;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Blob store abstraction over immutable byte streams named by content keys.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Check if a blob exists.
    async fn exists(&self, key: &ContentKey) -> StorageResult<bool>;

    /// Get a blob's size without fetching content.
    async fn head(&self, key: &ContentKey) -> StorageResult<BlobMeta>;

    /// Open a blob for random-access reads.
    ///
    /// Returns `NotFound` if no blob is stored under `key`.
    async fn open(&self, key: &ContentKey) -> StorageResult<Box<dyn BlobReader>>;

    /// Start a streaming write. Nothing is visible under `key` until
    /// [`StreamingUpload::finish`] succeeds.
    async fn put_stream(&self, key: &ContentKey) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Delete a blob. Missing blobs report `NotFound`.
    async fn delete(&self, key: &ContentKey) -> StorageResult<()>;

    /// Static identifier of the backend type (e.g., "s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()).
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobMeta {
    /// Blob size in bytes.
    pub size: u64,
}

/// An opened blob with a known size.
#[async_trait]
pub trait BlobReader: Send {
    /// Total size of the blob in bytes.
    fn size(&self) -> u64;

    /// Stream exactly `len` bytes starting at `start`.
    ///
    /// Fails with `InvalidRange` if the window extends past the end of the blob.
    async fn stream_range(self: Box<Self>, start: u64, len: u64) -> StorageResult<ByteStream>;

    /// Stream the whole blob.
    async fn into_stream(self: Box<Self>) -> StorageResult<ByteStream> {
        let size = self.size();
        self.stream_range(0, size).await
    }
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Finish the upload and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload, discarding everything written so far.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Check that `[start, start + len)` lies within a blob of `size` bytes.
pub(crate) fn check_window(start: u64, len: u64, size: u64) -> StorageResult<()> {
    match start.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(crate::error::StorageError::InvalidRange(format!(
            "window {start}+{len} exceeds blob size {size}"
        ))),
    }
}
