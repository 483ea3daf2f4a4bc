//! Shared primitives for all Rust crates in Lodge.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Result type used across Lodge crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
///
/// Every variant carries a stable protocol code (see [`AppError::code`])
/// that the HTTP layer serialises into error responses. Handlers map
/// repository sentinels into these variants; anything unexpected is wrapped
/// as [`AppError::Internal`] and never leaks storage detail to clients.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Email/password pair (or MFA code during login) did not match.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Request lacks valid authentication.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Access token is structurally valid but past its expiry.
    #[error("access token expired")]
    TokenExpired,

    /// A refresh token was presented a second time after rotation.
    #[error("refresh token reuse detected")]
    RefreshTokenReused,

    /// The presented refresh token does not exist or has expired.
    #[error("refresh token not found")]
    RefreshTokenNotFound,

    /// Password authentication succeeded but an MFA code is required.
    #[error("multi-factor authentication required")]
    MfaRequired,

    /// Submitted TOTP or recovery code is not valid.
    #[error("invalid multi-factor code")]
    InvalidMfaCode,

    /// The operation requires MFA to be enabled on the account.
    #[error("multi-factor authentication is not enabled")]
    MfaNotEnabled,

    /// MFA enrolment was attempted while MFA is already active.
    #[error("multi-factor authentication is already enabled")]
    MfaAlreadyEnabled,

    /// MFA verification was attempted with no enrolment in progress.
    #[error("no multi-factor enrolment is in progress")]
    MfaNotConfigured,

    /// Too many failed confirmation attempts; enrolment must restart.
    #[error("multi-factor setup locked after repeated failures")]
    MfaSetupLocked,

    /// User is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The account email address has not been verified yet.
    #[error("email address not verified")]
    EmailNotVerified,

    /// The user is not an active member of the server.
    #[error("active membership required")]
    MembershipRequired,

    /// The server owner account cannot be deleted.
    #[error("the server owner account cannot be deleted")]
    ServerOwnerUndeletable,

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Registration used a disposable email domain.
    #[error("disposable email addresses are not accepted")]
    DisposableEmail,

    /// The identifier belongs to a recently deleted account.
    #[error("this identifier belongs to a deleted account")]
    AccountTombstoned,

    /// Verification was requested for an already-verified address.
    #[error("email address is already verified")]
    EmailAlreadyVerified,

    /// A verification email was re-requested inside the cooldown window.
    #[error("verification email recently sent; try again later")]
    VerificationCooldown,

    /// Too many requests in the current window.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Request body exceeds the configured limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// A required downstream dependency is unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the stable protocol code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unauthorized(_) => "unauthorised",
            Self::TokenExpired => "token_expired",
            Self::RefreshTokenReused => "refresh_token_reused",
            Self::RefreshTokenNotFound => "refresh_token_not_found",
            Self::MfaRequired => "mfa_required",
            Self::InvalidMfaCode => "invalid_mfa_code",
            Self::MfaNotEnabled => "mfa_not_enabled",
            Self::MfaAlreadyEnabled => "mfa_already_enabled",
            Self::MfaNotConfigured => "mfa_not_configured",
            Self::MfaSetupLocked => "mfa_setup_locked",
            Self::Forbidden(_) => "forbidden",
            Self::EmailNotVerified => "email_not_verified",
            Self::MembershipRequired => "membership_required",
            Self::ServerOwnerUndeletable => "server_owner_undeletable",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "already_exists",
            Self::DisposableEmail => "disposable_email",
            Self::AccountTombstoned => "account_tombstoned",
            Self::EmailAlreadyVerified => "email_already_verified",
            Self::VerificationCooldown => "verification_cooldown",
            Self::RateLimited(_) => "rate_limited",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// True when the error should be logged as unexpected rather than
    /// returned as a client fault.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AppError::InvalidCredentials.code(), "invalid_credentials");
        assert_eq!(AppError::RefreshTokenReused.code(), "refresh_token_reused");
        assert_eq!(
            AppError::Conflict("duplicate".to_owned()).code(),
            "already_exists"
        );
        assert_eq!(AppError::MfaSetupLocked.code(), "mfa_setup_locked");
        assert_eq!(AppError::AccountTombstoned.code(), "account_tombstoned");
    }

    #[test]
    fn internal_errors_are_flagged() {
        assert!(AppError::Internal("boom".to_owned()).is_internal());
        assert!(!AppError::InvalidCredentials.is_internal());
    }
}
