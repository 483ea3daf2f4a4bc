use lodge_core::{AppError, AppResult};
use tracing::warn;

use super::token_crypto::{generate_token, normalise_recovery_code};
use super::{AuthService, LoginOutcome, UserRecord};

// Audit reasons recorded in the login-attempts table. Callers only ever
// see `invalid_credentials`; the table keeps the real outcome.
const REASON_SUCCESS: &str = "success";
const REASON_UNKNOWN_EMAIL: &str = "unknown_email";
const REASON_INVALID_PASSWORD: &str = "invalid_password";
const REASON_MFA_PENDING: &str = "password_ok_mfa_pending";
const REASON_INVALID_MFA_CODE: &str = "invalid_mfa_code";

impl AuthService {
    /// Authenticates with email and password.
    ///
    /// Unknown emails burn a dummy password verification so response time
    /// does not reveal account existence. MFA-enabled accounts receive a
    /// short-lived ticket instead of tokens.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginOutcome> {
        let normalised = email.trim().to_lowercase();
        let Some(user) = self.users.find_by_email(&normalised).await? else {
            self.password_hasher.verify_dummy(password);
            self.audit(&normalised, None, false, REASON_UNKNOWN_EMAIL).await;
            return Err(AppError::InvalidCredentials);
        };

        let valid = self
            .password_hasher
            .verify_password(password, &user.password_hash)?;
        if !valid {
            self.audit(&normalised, Some(user.id), false, REASON_INVALID_PASSWORD)
                .await;
            return Err(AppError::InvalidCredentials);
        }

        self.rehash_if_stale(&user, password).await;

        if user.mfa_enabled {
            let ticket = generate_token()?;
            self.mfa_tickets
                .store(&ticket, user.id, self.config.mfa_ticket_ttl)
                .await?;
            self.audit(&normalised, Some(user.id), false, REASON_MFA_PENDING)
                .await;
            return Ok(LoginOutcome::MfaChallenge { ticket });
        }

        let tokens = self.issue_token_pair(user.id).await?;
        self.audit(&normalised, Some(user.id), true, REASON_SUCCESS).await;
        Ok(LoginOutcome::Tokens {
            tokens,
            user: user.to_user(),
        })
    }

    /// Completes an MFA login: consumes the ticket and validates the code
    /// as TOTP first, then against unused recovery codes.
    pub async fn verify_mfa_login(&self, ticket: &str, code: &str) -> AppResult<LoginOutcome> {
        let Some(user_id) = self.mfa_tickets.consume(ticket).await? else {
            return Err(AppError::Unauthorized(
                "mfa ticket is invalid or expired".to_owned(),
            ));
        };

        let user = self.require_user(user_id).await?;
        if self.check_mfa_code(&user, code).await? {
            let tokens = self.issue_token_pair(user.id).await?;
            self.audit(&user.email, Some(user.id), true, REASON_SUCCESS).await;
            return Ok(LoginOutcome::Tokens {
                tokens,
                user: user.to_user(),
            });
        }

        self.audit(&user.email, Some(user.id), false, REASON_INVALID_MFA_CODE)
            .await;
        Err(AppError::InvalidCredentials)
    }

    /// Validates a code as TOTP, falling back to recovery codes.
    ///
    /// Every stored recovery code is inspected before deciding so the
    /// response time does not leak how many codes remain.
    pub(super) async fn check_mfa_code(&self, user: &UserRecord, code: &str) -> AppResult<bool> {
        let Some(ref secret_enc) = user.totp_secret_enc else {
            return Err(AppError::Internal(
                "mfa enabled but secret is missing".to_owned(),
            ));
        };

        let secret = self.secret_encryptor.decrypt(secret_enc)?;
        if self.totp.verify_code(&secret, code)? {
            return Ok(true);
        }

        let normalised = normalise_recovery_code(code);
        let mut matched_id = None;
        for record in self.recovery_codes.list(user.id).await? {
            let usable = record.used_at.is_none();
            let matches = self
                .password_hasher
                .verify_password(&normalised, &record.code_hash)?;
            if usable && matches && matched_id.is_none() {
                matched_id = Some(record.id);
            }
        }

        if let Some(code_id) = matched_id {
            self.recovery_codes.mark_used(code_id).await?;
            return Ok(true);
        }

        Ok(false)
    }

    async fn rehash_if_stale(&self, user: &UserRecord, password: &str) {
        let stale = match self.password_hasher.needs_rehash(&user.password_hash) {
            Ok(stale) => stale,
            Err(error) => {
                warn!(user_id = %user.id, %error, "failed to inspect password hash parameters");
                return;
            }
        };
        if !stale {
            return;
        }

        match self.password_hasher.hash_password(password) {
            Ok(hash) => {
                if let Err(error) = self.users.update_password_hash(user.id, &hash).await {
                    warn!(user_id = %user.id, %error, "failed to store rehashed password");
                }
            }
            Err(error) => warn!(user_id = %user.id, %error, "failed to rehash password"),
        }
    }

    pub(super) async fn audit(
        &self,
        email: &str,
        user_id: Option<lodge_domain::UserId>,
        success: bool,
        reason: &str,
    ) {
        if let Err(error) = self
            .login_attempts
            .record(email, user_id, success, reason)
            .await
        {
            warn!(%error, "failed to record login attempt");
        }
    }
}
