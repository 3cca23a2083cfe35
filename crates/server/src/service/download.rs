//! Range-aware retrieval.

use super::FileService;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use depot_core::{ByteRange, FileId, LogicalFile};
use depot_storage::{BlobReader, BlobStore, ByteStream};
use tracing::{debug, instrument, warn};

/// An opened download ready to be written to a response.
pub struct Download {
    pub file: LogicalFile,
    /// Total size of the stored blob.
    pub size: u64,
    /// Requested window, or `None` for the full content.
    pub range: Option<ByteRange>,
    pub body: ByteStream,
}

impl Download {
    /// Number of bytes `body` will yield.
    pub fn content_length(&self) -> u64 {
        self.range.map_or(self.size, |r| r.len())
    }
}

impl FileService {
    /// Resolve a file and open its content, optionally restricted to a `Range` header.
    #[instrument(skip_all, fields(file_id = %file_id))]
    pub async fn open_download(
        &self,
        file_id: FileId,
        range_header: Option<&str>,
    ) -> ApiResult<Download> {
        let file = self.get_file(file_id).await?;
        if file.is_dir {
            return Err(ApiError::BadRequest(format!(
                "{file_id} is a directory and cannot be downloaded"
            )));
        }

        let reader = self.storage.open(&file.content_key).await?;
        let size = reader.size();
        if size != file.size {
            warn!(
                content_key = %file.content_key,
                recorded = file.size,
                stored = size,
                "Stored blob size differs from the index"
            );
        }

        let (range, body) = match range_header {
            Some(header) => {
                let range = ByteRange::parse(header, size)?;
                let body = reader.stream_range(range.start, range.len()).await?;
                metrics::DOWNLOADS.with_label_values(&["partial"]).inc();
                (Some(range), body)
            }
            None => {
                metrics::DOWNLOADS.with_label_values(&["full"]).inc();
                (None, reader.into_stream().await?)
            }
        };

        debug!(content_key = %file.content_key, size, ?range, "Opened download");
        Ok(Download {
            file,
            size,
            range,
            body,
        })
    }
}
