//! HTTP request handlers.

pub mod files;
pub mod health;
pub mod uploads;

pub use files::*;
pub use health::*;
pub use uploads::*;

use crate::error::{ApiError, ApiResult};
use axum::extract::multipart::{Field, MultipartError};
use axum::http::HeaderMap;
use bytes::Bytes;
use depot_core::{ContentHash, FileId, SessionId};
use depot_storage::{StorageError, StorageResult};
use futures::{Stream, TryStreamExt};
use std::collections::HashMap;
use std::pin::Pin;

/// Header carrying a content hash, on requests and download responses.
pub const FILE_MD5_HEADER: &str = "x-file-md5";

/// Header carrying a declared upload size.
pub const FILE_SIZE_HEADER: &str = "x-file-size";

/// Name of the multipart part holding file bytes.
pub(crate) const FILE_FIELD: &str = "file";

/// Text parts of a multipart body seen before the file part.
#[derive(Debug, Default)]
pub(crate) struct FormFields(HashMap<String, String>);

impl FormFields {
    pub(crate) fn insert(&mut self, name: String, value: String) {
        self.0.insert(name, value);
    }

    /// First non-empty value among `names`.
    pub(crate) fn get(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|n| self.0.get(*n))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }
}

/// First candidate that is present and non-blank.
pub(crate) fn first_present<'a>(
    candidates: impl IntoIterator<Item = Option<&'a str>>,
) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub(crate) fn parse_file_id(value: &str) -> ApiResult<FileId> {
    FileId::parse(value).map_err(|e| ApiError::BadRequest(format!("invalid file id: {e}")))
}

pub(crate) fn parse_session_id(value: &str) -> ApiResult<SessionId> {
    SessionId::parse(value).map_err(|e| ApiError::BadRequest(format!("invalid session id: {e}")))
}

pub(crate) fn parse_hash(value: &str) -> ApiResult<ContentHash> {
    ContentHash::from_hex(value)
        .map_err(|e| ApiError::BadRequest(format!("invalid md5: {e}")))
}

pub(crate) fn parse_u64(field: &str, value: &str) -> ApiResult<u64> {
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {field}: {value:?}")))
}

pub(crate) fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("invalid multipart body: {}", e.body_text()))
}

/// Adapt a multipart file part to the byte stream the storage layer consumes.
pub(crate) fn field_stream<'a>(
    field: Field<'a>,
) -> Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send + 'a>> {
    Box::pin(field.map_err(|e| StorageError::Io(std::io::Error::other(e.body_text()))))
}
