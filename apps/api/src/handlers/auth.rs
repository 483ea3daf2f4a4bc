//! Authentication endpoints.

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use lodge_application::RegisterParams;
use lodge_domain::MemberStatus;
use tracing::{info, warn};

use crate::dto::{
    LoginRequest, LoginResponse, MfaVerifyRequest, PasswordRequest, RefreshRequest,
    RefreshResponse, RegisterRequest, TokenResponse, VerifyEmailRequest,
};
use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let outcome = state
        .auth_service
        .register(RegisterParams {
            email: request.email,
            username: request.username,
            password: request.password,
        })
        .await?;

    // The very first account becomes the server owner and an active
    // member; everyone after that joins via invite.
    match state
        .server_repository
        .initialize_if_missing(&state.server_name, outcome.user.id)
        .await
    {
        Ok(true) => {
            info!(owner_id = %outcome.user.id, "server initialised with its first account");
            if let Err(error) = state
                .member_repository
                .add(outcome.user.id, MemberStatus::Active)
                .await
            {
                warn!(%error, "failed to add owner membership");
            }
        }
        Ok(false) => {}
        Err(error) => warn!(%error, "failed to check server initialisation"),
    }

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            access_token: outcome.tokens.access_token,
            refresh_token: outcome.tokens.refresh_token,
            user: outcome.user,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = state
        .auth_service
        .login(&request.email, &request.password)
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let pair = state.auth_service.refresh(&request.refresh_token).await?;
    Ok(Json(pair.into()))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(request): Json<VerifyEmailRequest>,
) -> ApiResult<StatusCode> {
    state.auth_service.verify_email(&request.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn verify_mfa(
    State(state): State<AppState>,
    Json(request): Json<MfaVerifyRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = state
        .auth_service
        .verify_mfa_login(&request.ticket, &request.code)
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn verify_password(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<PasswordRequest>,
) -> ApiResult<StatusCode> {
    state
        .auth_service
        .verify_password(user_id, &request.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<StatusCode> {
    state.auth_service.resend_verification(user_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<StatusCode> {
    state.auth_service.revoke_all_refresh_tokens(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
