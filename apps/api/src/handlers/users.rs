//! Current-user endpoints: profile, MFA management, account deletion.

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use lodge_core::AppError;
use lodge_domain::{User, UserProfile};

use crate::dto::{
    MfaConfirmRequest, MfaEnrollmentResponse, PasswordRequest, ProfileUpdateRequest,
    RecoveryCodesResponse,
};
use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn get_me(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<User>> {
    let user = state
        .auth_service
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_owned()))?;
    Ok(Json(user))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<ProfileUpdateRequest>,
) -> ApiResult<Json<User>> {
    let profile = UserProfile {
        display_name: request.display_name,
        avatar_key: request.avatar_key,
        banner_key: request.banner_key,
        pronouns: request.pronouns,
        about: request.about,
        theme_primary: request.theme_primary,
        theme_accent: request.theme_accent,
    };
    state.auth_service.update_profile(user_id, &profile).await?;

    let user = state
        .auth_service
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_owned()))?;
    Ok(Json(user))
}

pub async fn delete_me(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<PasswordRequest>,
) -> ApiResult<StatusCode> {
    state
        .auth_service
        .delete_account(user_id, &request.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn enable_mfa(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<PasswordRequest>,
) -> ApiResult<Json<MfaEnrollmentResponse>> {
    let enrollment = state
        .auth_service
        .enable_mfa(user_id, &request.password)
        .await?;
    Ok(Json(MfaEnrollmentResponse {
        secret: enrollment.secret_base32,
        otpauth_uri: enrollment.otpauth_uri,
    }))
}

pub async fn confirm_mfa(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<MfaConfirmRequest>,
) -> ApiResult<Json<RecoveryCodesResponse>> {
    let recovery_codes = state.auth_service.confirm_mfa(user_id, &request.code).await?;
    Ok(Json(RecoveryCodesResponse { recovery_codes }))
}

pub async fn disable_mfa(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<PasswordRequest>,
) -> ApiResult<StatusCode> {
    state
        .auth_service
        .disable_mfa(user_id, &request.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn regenerate_recovery_codes(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<PasswordRequest>,
) -> ApiResult<Json<RecoveryCodesResponse>> {
    let recovery_codes = state
        .auth_service
        .regenerate_recovery_codes(user_id, &request.password)
        .await?;
    Ok(Json(RecoveryCodesResponse { recovery_codes }))
}
