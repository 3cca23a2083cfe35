//! Blob storage abstraction and backends for depot.
//!
//! This crate provides:
//! - A uniform interface for saving, range-reading and deleting immutable blobs
//! - Hash-while-writing helpers used by uploads and chunk merges
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod save;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use save::{HashingStream, SavedBlob, concat_blobs, save_stream};
pub use traits::{BlobMeta, BlobReader, BlobStore, ByteStream, StreamingUpload};

use depot_core::config::StorageConfig;
use std::sync::Arc;

/// Create a blob store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            create_bucket,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            if *create_bucket {
                backend.ensure_bucket().await?;
            }
            Ok(Arc::new(backend))
        }
    }
}
