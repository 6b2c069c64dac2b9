use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::blobs::{BlobRef, UploadHandle, image_content_type};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::state::AppState;

/// Body limit for sketch uploads, a little above the store's own limit so
/// oversized uploads get a `VALIDATION_ERROR` body rather than a bare 413.
pub fn upload_body_limit(max_blob_size: u64) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_blob_size.saturating_add(1024) as usize)
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Uploads",
    operation_id = "createUpload",
    summary = "Reserve an upload handle",
    description = "Issues a blob handle owned by the caller. `PUT` the image bytes to `write_url`, then pass `blob_ref` as `canvas_ref` when creating a generation.",
    responses(
        (status = 201, description = "Handle issued", body = UploadHandle),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(owner_id = %auth_user.owner_id))]
pub async fn create_upload(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.blobs.issue_upload_handle(&auth_user.owner_id).await?;
    Ok((StatusCode::CREATED, Json(handle)))
}

#[utoipa::path(
    put,
    path = "/{blob_ref}",
    tag = "Uploads",
    operation_id = "putUpload",
    summary = "Upload image bytes to a handle",
    description = "Stores the raw request body under the handle. `Content-Type` must be `image/png`, `image/jpeg`, `image/webp` or `image/gif`; it is kept and served back. A handle accepts exactly one upload.",
    params(("blob_ref" = String, Path, description = "Blob handle (UUID)")),
    request_body(content_type = "image/png", description = "Raw image bytes"),
    responses(
        (status = 201, description = "Upload stored"),
        (status = 400, description = "Empty or oversized body, or not an accepted image type (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Handle belongs to another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Handle not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Handle already uploaded (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, headers, body), fields(owner_id = %auth_user.owner_id, size = body.len()))]
pub async fn put_upload(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(blob_ref): Path<BlobRef>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    if body.is_empty() {
        return Err(AppError::Validation("Upload body must not be empty".into()));
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    state
        .blobs
        .complete_upload(&auth_user.owner_id, blob_ref, content_type, &body)
        .await?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    get,
    path = "/{blob_ref}",
    tag = "Uploads",
    operation_id = "getBlob",
    summary = "Fetch a stored image",
    description = "Target of the resolved `canvas_image_url` and `result_image_url`. Handles are unguessable, so no token is required. Supports `If-None-Match`.",
    params(("blob_ref" = String, Path, description = "Blob handle (UUID)")),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 404, description = "Blob not found or not uploaded (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers))]
pub async fn get_blob(
    State(state): State<AppState>,
    Path(blob_ref): Path<BlobRef>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let record = state
        .blobs
        .record(blob_ref)
        .await?
        .filter(|r| r.content_hash.is_some())
        .ok_or_else(|| AppError::NotFound(format!("Blob {blob_ref} not found")))?;

    // Content behind a handle never changes.
    let etag_value = format!("\"{blob_ref}\"");
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && (val == etag_value || val == "*")
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let (bytes, content_type) = state.blobs.read(record.id).await?;
    let content_type = content_type
        .as_deref()
        .and_then(image_content_type)
        .unwrap_or("application/octet-stream");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(header::CONTENT_SECURITY_POLICY, "default-src 'none'; sandbox")
        .header(header::CONTENT_LENGTH, bytes.len().to_string())
        .header(header::ETAG, &etag_value)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(bytes.into())
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}
