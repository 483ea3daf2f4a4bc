//! Category, channel, and override endpoints.

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use lodge_application::{ChannelUpdate, NewChannel};
use lodge_core::AppError;
use lodge_domain::{
    Category, CategoryId, Channel, ChannelId, OverrideTarget, PermissionOverride, Permissions,
    RoleId, UserId,
};

use crate::dto::{
    CreateCategoryRequest, CreateChannelRequest, OverrideTargetType, SetOverrideRequest,
    UpdateCategoryRequest, UpdateChannelRequest,
};
use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn list_channels(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Channel>>> {
    Ok(Json(state.channel_service.list_visible(user_id).await?))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<CreateChannelRequest>,
) -> ApiResult<(StatusCode, Json<Channel>)> {
    let channel = state
        .channel_service
        .create_channel(
            user_id,
            NewChannel {
                category_id: request.category_id,
                name: request.name,
                topic: request.topic,
                position: request.position,
                voice: request.voice,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(channel_id): Path<ChannelId>,
) -> ApiResult<Json<Channel>> {
    state
        .permission_service
        .check(user_id, Some(channel_id), Permissions::VIEW_CHANNELS)
        .await?;
    Ok(Json(state.channel_service.require_channel(channel_id).await?))
}

pub async fn update_channel(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(channel_id): Path<ChannelId>,
    Json(request): Json<UpdateChannelRequest>,
) -> ApiResult<Json<Channel>> {
    let channel = state
        .channel_service
        .update_channel(
            user_id,
            channel_id,
            ChannelUpdate {
                name: request.name,
                topic: request.topic,
                position: request.position,
                category_id: request.category_id,
            },
        )
        .await?;
    Ok(Json(channel))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(channel_id): Path<ChannelId>,
) -> ApiResult<StatusCode> {
    state
        .channel_service
        .delete_channel(user_id, channel_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.channel_service.list_categories().await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let category = state
        .channel_service
        .create_category(user_id, &request.name, request.position)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(category_id): Path<CategoryId>,
    Json(request): Json<UpdateCategoryRequest>,
) -> ApiResult<Json<Category>> {
    let category = state
        .channel_service
        .update_category(user_id, category_id, request.name.as_deref(), request.position)
        .await?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(category_id): Path<CategoryId>,
) -> ApiResult<StatusCode> {
    state
        .channel_service
        .delete_category(user_id, category_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_overrides(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(channel_id): Path<ChannelId>,
) -> ApiResult<Json<Vec<PermissionOverride>>> {
    Ok(Json(
        state
            .channel_service
            .list_overrides(user_id, channel_id)
            .await?,
    ))
}

pub async fn set_override(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(channel_id): Path<ChannelId>,
    Json(request): Json<SetOverrideRequest>,
) -> ApiResult<StatusCode> {
    let target = match request.target_type {
        OverrideTargetType::Role => OverrideTarget::Role(RoleId::from_uuid(request.target_id)),
        OverrideTargetType::User => OverrideTarget::User(UserId::from_uuid(request.target_id)),
    };

    state
        .channel_service
        .set_override(
            user_id,
            PermissionOverride {
                channel_id,
                target,
                allow: Permissions::from_bits(request.allow),
                deny: Permissions::from_bits(request.deny),
            },
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_override(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((channel_id, target_type, target_id)): Path<(ChannelId, String, uuid::Uuid)>,
) -> ApiResult<StatusCode> {
    let target = match target_type.as_str() {
        "role" => OverrideTarget::Role(RoleId::from_uuid(target_id)),
        "user" => OverrideTarget::User(UserId::from_uuid(target_id)),
        _ => {
            return Err(AppError::Validation(
                "override target must be 'role' or 'user'".to_owned(),
            )
            .into());
        }
    };

    state
        .channel_service
        .remove_override(user_id, channel_id, target)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
