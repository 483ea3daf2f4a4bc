//! HTTP error envelope for the API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lodge_core::AppError;
use serde::Serialize;

/// JSON error body: `{ "error": { "code", "message" } }`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ErrorResponse {
    fn new(code: &'static str, message: String) -> Self {
        Self {
            error: ErrorBody { code, message },
        }
    }
}

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

/// Maps an application error onto its response status.
fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Validation(_)
        | AppError::MfaNotEnabled
        | AppError::MfaNotConfigured
        | AppError::DisposableEmail => StatusCode::BAD_REQUEST,
        AppError::InvalidCredentials
        | AppError::Unauthorized(_)
        | AppError::TokenExpired
        | AppError::RefreshTokenReused
        | AppError::RefreshTokenNotFound
        | AppError::MfaRequired
        | AppError::InvalidMfaCode => StatusCode::UNAUTHORIZED,
        AppError::Forbidden(_)
        | AppError::EmailNotVerified
        | AppError::MembershipRequired
        | AppError::ServerOwnerUndeletable
        | AppError::MfaSetupLocked
        | AppError::AccountTombstoned => StatusCode::FORBIDDEN,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Conflict(_) | AppError::MfaAlreadyEnabled | AppError::EmailAlreadyVerified => {
            StatusCode::CONFLICT
        }
        AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        AppError::RateLimited(_) | AppError::VerificationCooldown => {
            StatusCode::TOO_MANY_REQUESTS
        }
        AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);

        // Storage detail stays in the log; clients get the generic shape.
        let (code, message) = if self.0.is_internal() {
            tracing::error!(error = %self.0, "request failed unexpectedly");
            ("internal_error", "internal server error".to_owned())
        } else {
            (self.0.code(), self.0.to_string())
        };

        let payload = Json(ErrorResponse::new(code, message));

        if status == StatusCode::TOO_MANY_REQUESTS {
            (status, [("retry-after", "60")], payload).into_response()
        } else {
            (status, payload).into_response()
        }
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;
