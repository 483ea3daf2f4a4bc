use lodge_core::{AppError, AppResult};
use lodge_domain::UserId;
use tracing::warn;

use super::{AuthService, TombstoneEntry, TombstoneKind};

impl AuthService {
    /// Deletes the caller's account.
    ///
    /// Requires a password re-check and refuses for the server owner. The
    /// identifier tombstones and the row deletion commit in one
    /// transaction; refresh-token revocation and permission-cache
    /// invalidation follow best-effort since the account is already gone.
    pub async fn delete_account(&self, user_id: UserId, password: &str) -> AppResult<()> {
        self.verify_password(user_id, password).await?;

        if self.server_owner.owner_id().await? == user_id {
            return Err(AppError::ServerOwnerUndeletable);
        }

        let user = self.require_user(user_id).await?;
        let mut tombstones = vec![TombstoneEntry {
            kind: TombstoneKind::Email,
            identifier_hmac: self.identity_hasher.hash_identifier(&user.email),
        }];
        if self.config.tombstone_usernames {
            tombstones.push(TombstoneEntry {
                kind: TombstoneKind::Username,
                identifier_hmac: self
                    .identity_hasher
                    .hash_identifier(&user.username.to_lowercase()),
            });
        }

        self.users.delete_with_tombstones(user_id, &tombstones).await?;

        if let Err(error) = self.refresh_tokens.revoke_all(user_id).await {
            warn!(%user_id, %error, "failed to revoke refresh tokens after deletion");
        }
        if let Err(error) = self.permission_invalidator.invalidate_user(user_id).await {
            warn!(%user_id, %error, "failed to invalidate permissions after deletion");
        }

        Ok(())
    }
}
