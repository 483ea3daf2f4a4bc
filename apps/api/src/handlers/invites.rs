//! Invite endpoints.

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use lodge_domain::{Invite, InviteId, Member};

use crate::dto::CreateInviteRequest;
use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Invite>>> {
    Ok(Json(state.invite_service.list(user_id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<CreateInviteRequest>,
) -> ApiResult<(StatusCode, Json<Invite>)> {
    let invite = state
        .invite_service
        .create(
            user_id,
            request.channel_id,
            request.max_uses,
            request.expires_at,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(invite)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(invite_id): Path<InviteId>,
) -> ApiResult<StatusCode> {
    state.invite_service.delete(user_id, invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Joining needs authentication and a verified email, but obviously not
/// an existing membership; it sits outside the member-gated router.
pub async fn join(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(code): Path<String>,
) -> ApiResult<(StatusCode, Json<Member>)> {
    let member = state.invite_service.join(user_id, &code).await?;
    Ok((StatusCode::CREATED, Json(member)))
}
