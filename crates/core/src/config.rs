//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Chunk size used when an upload-init request does not declare one.
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: u64,
    /// Smallest chunk size a client may declare.
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: u64,
    /// Largest chunk size a client may declare.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Request body limit for single-shot uploads, in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Seconds after which a session stuck in 'merging' may be merged again.
    #[serde(default = "default_merge_stale_after_secs")]
    pub merge_stale_after_secs: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_min_chunk_size() -> u64 {
    crate::MIN_CHUNK_SIZE
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

fn default_max_upload_size() -> u64 {
    crate::DEFAULT_MAX_UPLOAD_SIZE
}

fn default_merge_stale_after_secs() -> u64 {
    3600
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_chunk_size: default_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            max_upload_size: default_max_upload_size(),
            merge_stale_after_secs: default_merge_stale_after_secs(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Validate chunk size bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_chunk_size == 0 {
            return Err("server.min_chunk_size must be at least 1".to_string());
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(format!(
                "server.min_chunk_size {} exceeds server.max_chunk_size {}",
                self.min_chunk_size, self.max_chunk_size
            ));
        }
        if self.default_chunk_size < self.min_chunk_size
            || self.default_chunk_size > self.max_chunk_size
        {
            return Err(format!(
                "server.default_chunk_size {} is outside [{}, {}]",
                self.default_chunk_size, self.min_chunk_size, self.max_chunk_size
            ));
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (e.g., `endpoint/bucket/key` instead of `bucket.endpoint/key`).
        /// Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
        /// Create the bucket at startup when it does not exist.
        #[serde(default = "default_create_bucket")]
        create_bucket: bool,
    },
}

fn default_create_bucket() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err("s3 config requires a non-empty bucket".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { path } => {
                if path.as_os_str().is_empty() {
                    return Err("filesystem config requires a path".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Busy timeout in seconds while waiting on a locked database.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage and SQLite metadata
    /// with a 1-byte minimum chunk size so tests can use tiny chunks.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                min_chunk_size: 1,
                ..ServerConfig::default()
            },
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert!(config.metrics_enabled);
        assert_eq!(config.merge_stale_after_secs, 3600);
        assert_eq!(config.default_chunk_size, crate::DEFAULT_CHUNK_SIZE);
        assert_eq!(config.min_chunk_size, crate::MIN_CHUNK_SIZE);
        assert_eq!(config.max_chunk_size, crate::MAX_CHUNK_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_rejects_inverted_bounds() {
        let config = ServerConfig {
            min_chunk_size: 64,
            max_chunk_size: 32,
            default_chunk_size: 32,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            default_chunk_size: crate::MAX_CHUNK_SIZE + 1,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_config_s3_defaults() {
        let json = r#"{"type":"s3","bucket":"test","endpoint":"https://s3.amazonaws.com"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();

        match config {
            StorageConfig::S3 {
                force_path_style,
                create_bucket,
                ..
            } => {
                assert!(!force_path_style);
                assert!(create_bucket);
            }
            _ => panic!("expected S3 config"),
        }
    }

    #[test]
    fn test_storage_config_s3_validate_partial_credentials() {
        let invalid = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access-key".to_string()),
            secret_access_key: None,
            force_path_style: false,
            create_bucket: true,
        };
        assert!(invalid.validate().is_err());

        let valid = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access-key".to_string()),
            secret_access_key: Some("secret-key".to_string()),
            force_path_style: false,
            create_bucket: true,
        };
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn test_storage_config_s3_rejects_empty_bucket() {
        let json = r#"{"type":"s3","bucket":"  "}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metadata_config_timeout_default() {
        let json = r#"{"type":"sqlite","path":"/tmp/depot.db"}"#;
        let config: MetadataConfig = serde_json::from_str(json).unwrap();
        let MetadataConfig::Sqlite {
            query_timeout_secs, ..
        } = config;
        assert_eq!(query_timeout_secs, Some(30));
    }

    #[test]
    fn test_app_config_sections_default() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert!(matches!(config.storage, StorageConfig::Filesystem { .. }));
        assert!(config.validate().is_ok());
        assert_eq!(AppConfig::for_testing().server.min_chunk_size, 1);
    }
}
