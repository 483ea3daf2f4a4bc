//! Message search endpoint.

use axum::Json;
use axum::extract::{Extension, Query, State};
use lodge_application::SearchRequest;

use crate::dto::{SearchHitDto, SearchQueryParams, SearchResponse};
use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn messages(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(params): Query<SearchQueryParams>,
) -> ApiResult<Json<SearchResponse>> {
    let hits = state
        .message_service
        .search(
            user_id,
            SearchRequest {
                query: params.q,
                channel_id: params.channel_id,
                limit: params.limit.min(100),
            },
        )
        .await?;

    Ok(Json(SearchResponse {
        hits: hits
            .into_iter()
            .map(|hit| SearchHitDto {
                message_id: hit.message_id,
                channel_id: hit.channel_id,
                content: hit.content,
            })
            .collect(),
    }))
}
