//! Application state shared across handlers.

use crate::service::{FileService, UploadLimits};
use depot_core::config::AppConfig;
use depot_metadata::MetadataStore;
use depot_storage::BlobStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Blob storage backend, selected once at startup.
    pub storage: Arc<dyn BlobStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upload, download and delete pipelines.
    pub files: FileService,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let files = FileService::new(
            storage.clone(),
            metadata.clone(),
            UploadLimits::from(&config.server),
        );
        Self {
            config: Arc::new(config),
            storage,
            metadata,
            files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_metadata::SqliteStore;
    use depot_storage::FilesystemBackend;
    use tempfile::tempdir;

    #[tokio::test]
    async fn state_carries_configured_limits() {
        let temp = tempdir().unwrap();
        let storage: Arc<dyn BlobStore> =
            Arc::new(FilesystemBackend::new(temp.path().join("blobs")).await.unwrap());
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(temp.path().join("metadata.db"), None)
                .await
                .unwrap(),
        );

        let mut config = AppConfig::for_testing();
        config.server.max_upload_size = 1234;
        let state = AppState::new(config, storage, metadata);

        assert_eq!(state.files.limits().max_upload_size, 1234);
        assert_eq!(state.files.limits().min_chunk_size, 1);
        assert_eq!(state.storage.backend_name(), "filesystem");
    }
}
