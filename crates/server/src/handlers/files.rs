//! Single-shot upload, download, lookup and delete handlers.

use super::{
    FILE_FIELD, FILE_MD5_HEADER, FILE_SIZE_HEADER, FormFields, field_stream, first_present,
    header_str, multipart_error, parse_file_id, parse_hash, parse_u64,
};
use crate::error::{ApiError, ApiResult};
use crate::identity::Uploader;
use crate::service::{Download, SingleUpload};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use depot_core::LogicalFile;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Query parameters accepted by `POST /upload`.
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub md5: Option<String>,
    pub hash: Option<String>,
    pub size: Option<String>,
    pub name: Option<String>,
}

/// POST /upload - Store a file sent as multipart part `file`.
///
/// The hash and size are taken from the query, then the `X-File-MD5` and
/// `X-File-Size` headers, then form parts sent before the file part.
pub async fn upload_file(
    State(state): State<AppState>,
    uploader: Uploader,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<LogicalFile>> {
    let mut form = FormFields::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        if field_name != FILE_FIELD {
            let value = field.text().await.map_err(multipart_error)?;
            form.insert(field_name, value);
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let name = first_present([
            file_name.as_deref(),
            params.name.as_deref(),
            form.get(&["name", "filename"]),
        ])
        .ok_or_else(|| ApiError::BadRequest("missing file name".to_string()))?
        .to_string();

        let declared_hash = first_present([
            params.md5.as_deref(),
            params.hash.as_deref(),
            header_str(&headers, FILE_MD5_HEADER),
            form.get(&["md5", "hash"]),
        ])
        .map(parse_hash)
        .transpose()?;

        let declared_size = first_present([
            params.size.as_deref(),
            header_str(&headers, FILE_SIZE_HEADER),
            form.get(&["size"]),
        ])
        .map(|v| parse_u64("size", v))
        .transpose()?;

        let upload = SingleUpload {
            name,
            declared_hash,
            declared_size,
            uploader_id: uploader.id(),
        };
        let file = state.files.upload(upload, field_stream(field)).await?;
        return Ok(Json(file));
    }

    Err(ApiError::BadRequest(format!(
        "multipart body has no '{FILE_FIELD}' part"
    )))
}

/// Query parameters accepted by `GET /download`.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub id: Option<String>,
}

/// GET /download/{id} - Stream a file, honoring `Range`.
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    download(&state, &id, &headers).await
}

/// GET /download?id= - Query-string form of [`download_file`].
pub async fn download_by_query(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let id = first_present([query.id.as_deref()])
        .ok_or_else(|| ApiError::BadRequest("missing id".to_string()))?;
    download(&state, id, &headers).await
}

async fn download(state: &AppState, id: &str, headers: &HeaderMap) -> ApiResult<Response> {
    let file_id = parse_file_id(id)?;
    // A non-ASCII Range value can never be satisfied
    let range = headers
        .get(header::RANGE)
        .map(|v| v.to_str().unwrap_or_default());
    let download = state.files.open_download(file_id, range).await?;
    download_response(download)
}

fn download_response(download: Download) -> ApiResult<Response> {
    let status = if download.range.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(&download.file.name, NON_ALPHANUMERIC)
    );

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, download.content_length())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(FILE_MD5_HEADER, download.file.hash.to_hex());
    if let Some(range) = download.range {
        builder = builder.header(header::CONTENT_RANGE, range.content_range(download.size));
    }

    builder
        .body(Body::from_stream(download.body))
        .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
}

/// GET /files/{id} - Logical file descriptor.
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LogicalFile>> {
    let file = state.files.get_file(parse_file_id(&id)?).await?;
    Ok(Json(file))
}

/// Delete response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub id: String,
    pub blob_deleted: bool,
}

/// DELETE /delete/{id} - Delete a logical file.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let outcome = state.files.delete_file(parse_file_id(&id)?).await?;
    Ok(Json(DeleteResponse {
        id: outcome.file.id.to_string(),
        blob_deleted: outcome.blob_deleted,
    }))
}
