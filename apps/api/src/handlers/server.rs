//! Server settings endpoints.

use axum::Json;
use axum::extract::{Extension, State};
use lodge_domain::{ChannelId, Permissions, ServerConfig};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateServerRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nested_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nested_option")]
    pub default_channel_id: Option<Option<ChannelId>>,
}

fn nested_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub async fn get(State(state): State<AppState>) -> ApiResult<Json<ServerConfig>> {
    Ok(Json(state.server_repository.get().await?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<UpdateServerRequest>,
) -> ApiResult<Json<ServerConfig>> {
    state
        .permission_service
        .check(user_id, None, Permissions::MANAGE_SERVER)
        .await?;

    let config = state
        .server_repository
        .update(
            request.name.as_deref(),
            request
                .description
                .as_ref()
                .map(|inner| inner.as_deref()),
            request.default_channel_id,
        )
        .await?;
    Ok(Json(config))
}
