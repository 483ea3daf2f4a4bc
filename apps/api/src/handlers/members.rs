//! Membership and moderation endpoints.

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use lodge_domain::{Member, UserId};

use crate::dto::{NicknameRequest, TimeoutRequest};
use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Member>>> {
    Ok(Json(state.member_service.list().await?))
}

pub async fn update_own_nickname(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<NicknameRequest>,
) -> ApiResult<StatusCode> {
    state
        .member_service
        .update_own_nickname(user_id, request.nickname.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<StatusCode> {
    state.member_service.leave(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn kick(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(target): Path<UserId>,
) -> ApiResult<StatusCode> {
    state.member_service.kick(user_id, target).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ban(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(target): Path<UserId>,
) -> ApiResult<StatusCode> {
    state.member_service.ban(user_id, target).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unban(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(target): Path<UserId>,
) -> ApiResult<StatusCode> {
    state.member_service.unban(user_id, target).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn timeout(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(target): Path<UserId>,
    Json(request): Json<TimeoutRequest>,
) -> ApiResult<StatusCode> {
    state
        .member_service
        .timeout(user_id, target, request.until)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_timeout(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(target): Path<UserId>,
) -> ApiResult<StatusCode> {
    state.member_service.clear_timeout(user_id, target).await?;
    Ok(StatusCode::NO_CONTENT)
}
