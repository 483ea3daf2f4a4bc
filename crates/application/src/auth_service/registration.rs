use lodge_core::{AppError, AppResult};
use lodge_domain::{EmailAddress, Username, validate_password};
use tracing::warn;

use super::token_crypto::{generate_token, hash_token};
use super::{AuthService, NewUser, TokenPair, TombstoneKind};

/// Parameters for account registration.
#[derive(Debug, Clone)]
pub struct RegisterParams {
    /// Email address for the new account.
    pub email: String,
    /// Username for the new account.
    pub username: String,
    /// Plaintext password.
    pub password: String,
}

/// A freshly registered account with its first token pair.
#[derive(Debug)]
pub struct RegisterOutcome {
    /// The created user.
    pub user: lodge_domain::User,
    /// Access + refresh tokens.
    pub tokens: TokenPair,
}

impl AuthService {
    /// Registers a new account.
    ///
    /// The user row and its pending verification row are inserted in one
    /// transaction; the verification email and token issuance follow. A
    /// failed blocklist fetch never blocks registration, and a failed
    /// email send is logged rather than surfaced.
    pub async fn register(&self, params: RegisterParams) -> AppResult<RegisterOutcome> {
        let email = EmailAddress::new(&params.email)?;
        let username = Username::new(&params.username)?;
        validate_password(&params.password)?;

        if self.disposable_emails.is_blocked(email.domain()) {
            return Err(AppError::DisposableEmail);
        }

        let email_hmac = self.identity_hasher.hash_identifier(email.as_str());
        if self.tombstones.exists(TombstoneKind::Email, &email_hmac).await? {
            return Err(AppError::AccountTombstoned);
        }

        // Friendly pre-checks; the unique constraints on the insert below
        // remain the authority under races.
        if self.users.find_by_email(email.as_str()).await?.is_some() {
            return Err(AppError::Conflict("email is already taken".to_owned()));
        }
        if self
            .users
            .find_by_username(&username.lowercase())
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("username is already taken".to_owned()));
        }
        if self.config.tombstone_usernames {
            let username_hmac = self.identity_hasher.hash_identifier(&username.lowercase());
            if self
                .tombstones
                .exists(TombstoneKind::Username, &username_hmac)
                .await?
            {
                return Err(AppError::AccountTombstoned);
            }
        }

        let password_hash = self.password_hasher.hash_password(&params.password)?;
        let verification_token = generate_token()?;
        let token_expires_at = chrono::Utc::now() + self.config.verification_token_ttl;

        let new_user = NewUser {
            email: email.as_str().to_owned(),
            username: username.as_str().to_owned(),
            username_lower: username.lowercase(),
            password_hash,
        };
        let user_id = self
            .users
            .create_with_verification(&new_user, &hash_token(&verification_token), token_expires_at)
            .await?;

        if let Err(error) = self
            .send_verification_email(email.as_str(), &verification_token)
            .await
        {
            warn!(%user_id, %error, "verification email failed to send");
        }

        let tokens = self.issue_token_pair(user_id).await?;
        let user = self.require_user(user_id).await?.to_user();

        Ok(RegisterOutcome { user, tokens })
    }

    pub(super) async fn send_verification_email(
        &self,
        email: &str,
        raw_token: &str,
    ) -> AppResult<()> {
        let link = format!("{}/verify-email?token={raw_token}", self.config.server_url);
        let subject = format!("Verify your {} account", self.config.server_name);
        let body = format!(
            "Welcome to {}!\n\nConfirm your email address by opening this link:\n\n{link}\n\n\
             The link expires in {} hours. If you did not create this account, you can ignore \
             this message.\n",
            self.config.server_name,
            self.config.verification_token_ttl.num_hours().max(1),
        );
        self.email.send_email(email, &subject, &body).await
    }
}
