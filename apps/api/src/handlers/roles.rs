//! Role endpoints.

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use lodge_application::RoleUpdate;
use lodge_domain::{Permissions, Role, RoleId, UserId};

use crate::dto::{CreateRoleRequest, UpdateRoleRequest};
use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Role>>> {
    Ok(Json(state.role_service.list().await?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<Role>)> {
    let role = state
        .role_service
        .create(
            user_id,
            &request.name,
            Permissions::from_bits(request.permissions),
            request.position,
            request.color,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(role_id): Path<RoleId>,
    Json(request): Json<UpdateRoleRequest>,
) -> ApiResult<Json<Role>> {
    let role = state
        .role_service
        .update(
            user_id,
            role_id,
            RoleUpdate {
                name: request.name,
                permissions: request.permissions.map(Permissions::from_bits),
                position: request.position,
                color: request.color,
            },
        )
        .await?;
    Ok(Json(role))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(role_id): Path<RoleId>,
) -> ApiResult<StatusCode> {
    state.role_service.delete(user_id, role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((target, role_id)): Path<(UserId, RoleId)>,
) -> ApiResult<StatusCode> {
    state.role_service.assign(user_id, target, role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unassign(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((target, role_id)): Path<(UserId, RoleId)>,
) -> ApiResult<StatusCode> {
    state.role_service.unassign(user_id, target, role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
