//! Storage test utilities.

use async_trait::async_trait;
use depot_core::ContentKey;
use depot_storage::{BlobMeta, BlobReader, BlobStore, StorageResult, StreamingUpload};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// A blob store wrapper that counts writes and can hold reads.
///
/// While held, `open` parks until [`TrackingStore::release`] is called, which
/// lets a test drop a request in the middle of a merge.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TrackingStore {
    inner: Arc<dyn BlobStore>,
    puts: AtomicUsize,
    opens: AtomicUsize,
    held: AtomicBool,
    released: Notify,
}

#[allow(dead_code)]
impl TrackingStore {
    pub fn new(inner: Arc<dyn BlobStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            puts: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            held: AtomicBool::new(false),
            released: Notify::new(),
        })
    }

    /// Number of `put_stream` calls so far.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of `open` calls so far, including parked ones.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Park subsequent `open` calls.
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Let parked and future `open` calls through.
    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.released.notify_waiters();
    }

    async fn wait_released(&self) {
        loop {
            let notified = self.released.notified();
            if !self.held.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl BlobStore for TrackingStore {
    async fn exists(&self, key: &ContentKey) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &ContentKey) -> StorageResult<BlobMeta> {
        self.inner.head(key).await
    }

    async fn open(&self, key: &ContentKey) -> StorageResult<Box<dyn BlobReader>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.wait_released().await;
        self.inner.open(key).await
    }

    async fn put_stream(&self, key: &ContentKey) -> StorageResult<Box<dyn StreamingUpload>> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put_stream(key).await
    }

    async fn delete(&self, key: &ContentKey) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}
