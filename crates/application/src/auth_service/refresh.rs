use lodge_core::{AppError, AppResult};
use tracing::warn;

use super::token_crypto::generate_token;
use super::{AuthService, RotateStatus, TokenPair};

impl AuthService {
    /// Rotates a refresh token and issues a fresh access token.
    ///
    /// Rotation is a single atomic step in the coordination store: at most
    /// one call per token id can ever succeed. Presenting a consumed id is
    /// treated as evidence of family compromise, so every live token of
    /// the affected user is revoked before the error is returned.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let new_token = generate_token()?;
        let status = self
            .refresh_tokens
            .rotate(refresh_token, &new_token, self.config.refresh_token_ttl)
            .await?;

        match status {
            RotateStatus::Rotated { user_id } => {
                let access_token = self.access_tokens.issue(user_id)?;
                Ok(TokenPair {
                    access_token,
                    refresh_token: new_token,
                })
            }
            RotateStatus::NotFound => Err(AppError::RefreshTokenNotFound),
            RotateStatus::Reused { user_id } => {
                if let Some(user_id) = user_id {
                    if let Err(error) = self.refresh_tokens.revoke_all(user_id).await {
                        warn!(%user_id, %error, "failed to revoke token family after reuse");
                    }
                }
                Err(AppError::RefreshTokenReused)
            }
        }
    }

    /// Revokes every live refresh token of the user.
    pub async fn revoke_all_refresh_tokens(&self, user_id: lodge_domain::UserId) -> AppResult<u64> {
        self.refresh_tokens.revoke_all(user_id).await
    }
}
