//! Request guards: bearer authentication and membership gates.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use lodge_core::AppError;
use lodge_domain::UserId;

use crate::error::ApiResult;
use crate::state::AppState;

/// Authenticated caller, inserted as a request extension.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Requires a valid access token; inserts [`AuthUser`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(&request)
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))?;

    let user_id = state.auth_service.validate_access_token(token)?;
    request.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(request).await)
}

/// Requires a verified email on top of [`require_auth`]; used for routes
/// a non-member may call, like invite redemption.
pub async fn require_verified(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let AuthUser(user_id) = *request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))?;

    let user = state
        .auth_service
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("account no longer exists".to_owned()))?;
    if !user.email_verified {
        return Err(AppError::EmailNotVerified.into());
    }

    Ok(next.run(request).await)
}

/// Requires a verified email and an active membership on top of
/// [`require_auth`]; applied to every chat-surface route.
pub async fn require_active_member(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let AuthUser(user_id) = *request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))?;

    let user = state
        .auth_service
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("account no longer exists".to_owned()))?;
    if !user.email_verified {
        return Err(AppError::EmailNotVerified.into());
    }

    if !state.member_service.is_active_member(user_id).await? {
        return Err(AppError::MembershipRequired.into());
    }

    Ok(next.run(request).await)
}
