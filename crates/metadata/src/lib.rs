//! Metadata store abstraction and implementations for depot.
//!
//! This crate provides the content index and upload bookkeeping:
//! - Logical files and (hash, size) dedup lookups
//! - Reference counts over shared content keys
//! - Resumable upload sessions and their chunks

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{FileRow, MergeClaim, PartFileChunkRow, PartFileRow};
pub use store::{MetadataStore, SqliteStore};

use depot_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
