//! Resumable upload handlers.

use super::{
    FILE_FIELD, FILE_MD5_HEADER, FormFields, field_stream, first_present, header_str,
    multipart_error, parse_hash, parse_session_id, parse_u64,
};
use crate::error::{ApiError, ApiResult};
use crate::identity::Uploader;
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::HeaderMap;
use depot_core::upload::{
    ChunkUploadResponse, CompleteUploadRequest, CompleteUploadResponse, InitUploadRequest,
    InitUploadResponse,
};
use serde::Deserialize;

fn json_error(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

/// POST /upload/init - Start a resumable upload.
pub async fn init_upload(
    State(state): State<AppState>,
    uploader: Uploader,
    payload: Result<Json<InitUploadRequest>, JsonRejection>,
) -> ApiResult<Json<InitUploadResponse>> {
    let Json(req) = payload.map_err(json_error)?;
    let response = state.files.init_upload(req, uploader.id()).await?;
    Ok(Json(response))
}

/// Query parameters accepted by `POST /upload/chunk`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkParams {
    pub session_id: Option<String>,
    pub chunk_index: Option<String>,
    pub md5: Option<String>,
    pub hash: Option<String>,
}

/// POST /upload/chunk - Store one chunk sent as multipart part `file`.
///
/// `sessionId`, `chunkIndex` and the chunk's MD5 may also be sent as form
/// parts ahead of the file part. The MD5 is required.
#[tracing::instrument(skip_all)]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Query(params): Query<ChunkParams>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<ChunkUploadResponse>> {
    let mut form = FormFields::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        if field_name != FILE_FIELD {
            let value = field.text().await.map_err(multipart_error)?;
            form.insert(field_name, value);
            continue;
        }

        let session_id = first_present([
            params.session_id.as_deref(),
            form.get(&["sessionId", "session_id"]),
        ])
        .ok_or_else(|| ApiError::BadRequest("missing sessionId".to_string()))
        .and_then(parse_session_id)?;

        let chunk_index = first_present([
            params.chunk_index.as_deref(),
            form.get(&["chunkIndex", "chunk_index"]),
        ])
        .ok_or_else(|| ApiError::BadRequest("missing chunkIndex".to_string()))
        .and_then(|v| parse_u64("chunkIndex", v))?;

        let declared_hash = first_present([
            params.md5.as_deref(),
            params.hash.as_deref(),
            header_str(&headers, FILE_MD5_HEADER),
            form.get(&["md5", "hash"]),
        ])
        .ok_or_else(|| ApiError::BadRequest("missing hash".to_string()))
        .and_then(parse_hash)?;

        let response = state
            .files
            .upload_chunk(session_id, chunk_index, declared_hash, field_stream(field))
            .await?;
        return Ok(Json(response));
    }

    Err(ApiError::BadRequest(format!(
        "multipart body has no '{FILE_FIELD}' part"
    )))
}

/// POST /upload/complete - Merge a session's chunks into a file.
pub async fn complete_upload(
    State(state): State<AppState>,
    payload: Result<Json<CompleteUploadRequest>, JsonRejection>,
) -> ApiResult<Json<CompleteUploadResponse>> {
    let Json(req) = payload.map_err(json_error)?;
    let response = state.files.complete_upload(req.session_id).await?;
    Ok(Json(response))
}
