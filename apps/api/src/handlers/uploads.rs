//! Attachment upload and download endpoints.

use axum::Json;
use axum::extract::{Extension, Multipart, Path, State};
use axum::http::StatusCode;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use lodge_core::AppError;
use lodge_domain::{Attachment, AttachmentId};

use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn upload(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Attachment>)> {
    let field = multipart
        .next_field()
        .await
        .map_err(|error| AppError::Validation(format!("malformed multipart body: {error}")))?
        .ok_or_else(|| AppError::Validation("upload is missing its file field".to_owned()))?;

    let file_name = field.file_name().unwrap_or("upload.bin").to_owned();
    let mime_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_owned();
    let bytes = field
        .bytes()
        .await
        .map_err(|error| AppError::PayloadTooLarge(format!("upload read failed: {error}")))?;

    let attachment = state
        .attachment_service
        .upload(user_id, &file_name, &mime_type, &bytes)
        .await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

pub async fn download(
    State(state): State<AppState>,
    Path(attachment_id): Path<AttachmentId>,
) -> ApiResult<Response> {
    let (attachment, bytes) = state.attachment_service.download(attachment_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, attachment.mime_type),
            (
                header::CACHE_CONTROL,
                "private, max-age=31536000, immutable".to_owned(),
            ),
        ],
        bytes,
    )
        .into_response())
}
