//! Hash-while-writing helpers on top of [`BlobStore`].

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobReader, BlobStore};
use bytes::Bytes;
use depot_core::{ContentHash, ContentHasher, ContentKey};
use futures::{Stream, StreamExt, TryStreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Outcome of a successful streaming save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedBlob {
    pub key: ContentKey,
    /// Bytes actually written.
    pub size: u64,
    /// Hash computed over the bytes actually written.
    pub hash: ContentHash,
}

/// Stream transform that hashes and counts every byte passing through.
///
/// With a limit set, the stream yields [`StorageError::TooLarge`] as soon
/// as the running total would exceed it.
pub struct HashingStream<S> {
    inner: S,
    hasher: ContentHasher,
    size: u64,
    limit: Option<u64>,
    exceeded: bool,
}

impl<S> HashingStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            hasher: ContentHasher::default(),
            size: 0,
            limit: None,
            exceeded: false,
        }
    }

    /// Fail the stream once more than `limit` bytes have been seen.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Bytes seen so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Consume the transform, returning the digest and byte count.
    pub fn finalize(self) -> (ContentHash, u64) {
        (self.hasher.finalize(), self.size)
    }
}

impl<S> Stream for HashingStream<S>
where
    S: Stream<Item = StorageResult<Bytes>> + Unpin,
{
    type Item = StorageResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.exceeded {
            return Poll::Ready(None);
        }
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let next = this.size + chunk.len() as u64;
                if let Some(limit) = this.limit
                    && next > limit
                {
                    this.exceeded = true;
                    return Poll::Ready(Some(Err(StorageError::TooLarge { limit })));
                }
                this.hasher.update(&chunk);
                this.size = next;
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

/// Stream `stream` into a new blob under `key`, hashing in transit.
///
/// On any stream or backend error the upload is aborted and nothing becomes
/// visible under `key`.
pub async fn save_stream<S>(
    store: &dyn BlobStore,
    key: &ContentKey,
    stream: S,
    limit: Option<u64>,
) -> StorageResult<SavedBlob>
where
    S: Stream<Item = StorageResult<Bytes>> + Unpin + Send,
{
    let mut hashing = HashingStream::new(stream);
    if let Some(limit) = limit {
        hashing = hashing.with_limit(limit);
    }

    let mut upload = store.put_stream(key).await?;

    let copied: StorageResult<()> = async {
        while let Some(chunk) = hashing.next().await {
            upload.write(chunk?).await?;
        }
        Ok(())
    }
    .await;

    if let Err(err) = copied {
        if let Err(abort_err) = upload.abort().await {
            warn!(content_key = %key, error = %abort_err, "Failed to abort blob upload");
        }
        return Err(err);
    }

    let written = upload.finish().await?;
    let (hash, size) = hashing.finalize();
    debug_assert_eq!(written, size);
    debug!(content_key = %key, size, hash = %hash, "Saved blob");

    Ok(SavedBlob {
        key: key.clone(),
        size,
        hash,
    })
}

/// Concatenate `parts` in order into a new blob under `dest`.
///
/// Parts are opened one at a time. A missing or unreadable part aborts the
/// upload, leaving nothing under `dest`.
pub async fn concat_blobs(
    store: &dyn BlobStore,
    parts: &[ContentKey],
    dest: &ContentKey,
) -> StorageResult<SavedBlob> {
    let mut upload = store.put_stream(dest).await?;
    let mut hasher = ContentHasher::default();
    let mut size = 0u64;

    let copied: StorageResult<()> = async {
        for part in parts {
            let mut stream = store.open(part).await?.into_stream().await?;
            while let Some(chunk) = stream.try_next().await? {
                hasher.update(&chunk);
                size += chunk.len() as u64;
                upload.write(chunk).await?;
            }
        }
        Ok(())
    }
    .await;

    if let Err(err) = copied {
        if let Err(abort_err) = upload.abort().await {
            warn!(content_key = %dest, error = %abort_err, "Failed to abort concatenation");
        }
        return Err(err);
    }

    let written = upload.finish().await?;
    debug_assert_eq!(written, size);
    let hash = hasher.finalize();
    debug!(content_key = %dest, parts = parts.len(), size, hash = %hash, "Concatenated blobs");

    Ok(SavedBlob {
        key: dest.clone(),
        size,
        hash,
    })
}
