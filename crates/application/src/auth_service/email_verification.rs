use lodge_core::{AppError, AppResult};

use super::token_crypto::{generate_token, hash_token};
use super::AuthService;

impl AuthService {
    /// Consumes a verification token and marks the owner's email verified.
    ///
    /// Reuse and expiry are indistinguishable to the caller.
    pub async fn verify_email(&self, raw_token: &str) -> AppResult<()> {
        let Some(user_id) = self
            .verifications
            .consume_valid(&hash_token(raw_token))
            .await?
        else {
            return Err(AppError::Validation(
                "verification token is invalid or expired".to_owned(),
            ));
        };

        self.users.mark_email_verified(user_id).await
    }

    /// Issues a replacement verification token, subject to the per-user
    /// cooldown, and emails it.
    pub async fn resend_verification(&self, user_id: lodge_domain::UserId) -> AppResult<()> {
        let user = self.require_user(user_id).await?;
        if user.email_verified {
            return Err(AppError::EmailAlreadyVerified);
        }

        let raw_token = generate_token()?;
        let expires_at = chrono::Utc::now() + self.config.verification_token_ttl;
        let replaced = self
            .verifications
            .replace_after_cooldown(
                user_id,
                &hash_token(&raw_token),
                expires_at,
                self.config.verification_cooldown,
            )
            .await?;
        if !replaced {
            return Err(AppError::VerificationCooldown);
        }

        self.send_verification_email(&user.email, &raw_token).await
    }
}
