use lodge_core::{AppError, AppResult};
use lodge_domain::UserId;

use super::token_crypto::{generate_recovery_code, normalise_recovery_code};
use super::{AuthService, MfaEnrollment, RECOVERY_CODE_COUNT};

impl AuthService {
    /// Starts TOTP enrolment.
    ///
    /// The generated secret is encrypted and parked as "pending" with a
    /// short TTL; MFA only activates once [`AuthService::confirm_mfa`]
    /// sees a valid code from the authenticator.
    pub async fn enable_mfa(&self, user_id: UserId, password: &str) -> AppResult<MfaEnrollment> {
        self.verify_password(user_id, password).await?;

        let user = self.require_user(user_id).await?;
        if user.mfa_enabled {
            return Err(AppError::MfaAlreadyEnabled);
        }

        let (secret_bytes, secret_base32, otpauth_uri) =
            self.totp.generate_secret(&user.email)?;
        let secret_enc = self.secret_encryptor.encrypt(&secret_bytes)?;
        self.pending_mfa
            .store(user_id, &secret_enc, self.config.pending_mfa_ttl)
            .await?;

        Ok(MfaEnrollment {
            secret_base32,
            otpauth_uri,
        })
    }

    /// Confirms a pending enrolment with a code from the authenticator.
    ///
    /// A wrong code re-parks the secret for retry and bumps the failure
    /// counter; at the cap the pending secret is discarded and the call
    /// reports the enrolment as locked. Success stores the hashed recovery
    /// codes and enables MFA in one transaction, returning the plaintext
    /// codes exactly once.
    pub async fn confirm_mfa(&self, user_id: UserId, code: &str) -> AppResult<Vec<String>> {
        let Some(secret_enc) = self.pending_mfa.take(user_id).await? else {
            return Err(AppError::MfaNotConfigured);
        };

        let secret = self.secret_encryptor.decrypt(&secret_enc)?;
        if !self.totp.verify_code(&secret, code)? {
            let attempts = self
                .pending_mfa
                .increment_attempts(user_id, self.config.pending_mfa_ttl)
                .await?;
            if attempts >= self.config.mfa_confirm_attempt_cap {
                self.pending_mfa.clear(user_id).await?;
                return Err(AppError::MfaSetupLocked);
            }
            self.pending_mfa
                .restore(user_id, &secret_enc, self.config.pending_mfa_ttl)
                .await?;
            return Err(AppError::InvalidMfaCode);
        }

        let (codes, hashes) = self.generate_recovery_set()?;
        self.users.enable_mfa(user_id, &secret_enc, &hashes).await?;
        self.pending_mfa.clear(user_id).await?;

        Ok(codes)
    }

    /// Disables MFA after a password re-check.
    pub async fn disable_mfa(&self, user_id: UserId, password: &str) -> AppResult<()> {
        self.verify_password(user_id, password).await?;

        let user = self.require_user(user_id).await?;
        if !user.mfa_enabled {
            return Err(AppError::MfaNotEnabled);
        }

        self.users.disable_mfa(user_id).await
    }

    /// Replaces the whole recovery-code set after a password re-check.
    pub async fn regenerate_recovery_codes(
        &self,
        user_id: UserId,
        password: &str,
    ) -> AppResult<Vec<String>> {
        self.verify_password(user_id, password).await?;

        let user = self.require_user(user_id).await?;
        if !user.mfa_enabled {
            return Err(AppError::MfaNotEnabled);
        }

        let (codes, hashes) = self.generate_recovery_set()?;
        self.recovery_codes.replace_all(user_id, &hashes).await?;
        Ok(codes)
    }

    fn generate_recovery_set(&self) -> AppResult<(Vec<String>, Vec<String>)> {
        let mut codes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        let mut hashes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        for _ in 0..RECOVERY_CODE_COUNT {
            let code = generate_recovery_code()?;
            let hash = self
                .password_hasher
                .hash_password(&normalise_recovery_code(&code))?;
            codes.push(code);
            hashes.push(hash);
        }
        Ok((codes, hashes))
    }
}
