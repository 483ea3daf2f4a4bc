//! Message endpoints.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use lodge_application::{HistoryPage, NewMessage};
use lodge_domain::{ChannelId, Message, MessageId};

use crate::dto::{CreateMessageRequest, HistoryQuery, UpdateMessageRequest};
use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn history(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(channel_id): Path<ChannelId>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state
        .message_service
        .history(
            user_id,
            channel_id,
            HistoryPage {
                before: query.before,
                limit: query.limit,
            },
        )
        .await?;
    Ok(Json(messages))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(channel_id): Path<ChannelId>,
    Json(request): Json<CreateMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let message = state
        .message_service
        .send(NewMessage {
            channel_id,
            author_id: user_id,
            content: request.content,
            reply_to: request.reply_to,
            attachment_ids: request.attachment_ids,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((_channel_id, message_id)): Path<(ChannelId, MessageId)>,
    Json(request): Json<UpdateMessageRequest>,
) -> ApiResult<Json<Message>> {
    let message = state
        .message_service
        .edit(user_id, message_id, &request.content)
        .await?;
    Ok(Json(message))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((_channel_id, message_id)): Path<(ChannelId, MessageId)>,
) -> ApiResult<StatusCode> {
    state.message_service.delete(user_id, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pin(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((_channel_id, message_id)): Path<(ChannelId, MessageId)>,
) -> ApiResult<StatusCode> {
    state
        .message_service
        .set_pinned(user_id, message_id, true)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unpin(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((_channel_id, message_id)): Path<(ChannelId, MessageId)>,
) -> ApiResult<StatusCode> {
    state
        .message_service
        .set_pinned(user_id, message_id, false)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pinned(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(channel_id): Path<ChannelId>,
) -> ApiResult<Json<Vec<Message>>> {
    Ok(Json(state.message_service.pinned(user_id, channel_id).await?))
}
