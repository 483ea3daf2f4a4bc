//! Invite records.

use chrono::{DateTime, Utc};
use lodge_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, InviteId, UserId};

/// Length of generated invite codes.
pub const INVITE_CODE_LENGTH: usize = 10;

/// An invite link into the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    /// Unique invite identifier.
    pub id: InviteId,
    /// URL-safe code embedded in the invite link.
    pub code: String,
    /// Channel the invite lands the user in.
    pub channel_id: ChannelId,
    /// Member who created the invite.
    pub creator_id: UserId,
    /// Maximum number of redemptions, if bounded.
    pub max_uses: Option<i32>,
    /// Number of successful redemptions so far.
    pub uses: i32,
    /// Expiry time, if bounded.
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Invite {
    /// True when the invite can still be redeemed at `now`.
    #[must_use]
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.expires_at
            && now >= expires_at
        {
            return false;
        }
        if let Some(max_uses) = self.max_uses
            && self.uses >= max_uses
        {
            return false;
        }
        true
    }
}

/// Validates the shape of a client-presented invite code.
pub fn validate_invite_code(code: &str) -> AppResult<()> {
    let valid_length = code.len() == INVITE_CODE_LENGTH;
    let valid_alphabet = code.chars().all(|ch| ch.is_ascii_alphanumeric());
    if !valid_length || !valid_alphabet {
        return Err(AppError::Validation("malformed invite code".to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn invite() -> Invite {
        Invite {
            id: InviteId::new(),
            code: "abcDEF1234".to_owned(),
            channel_id: ChannelId::new(),
            creator_id: UserId::new(),
            max_uses: None,
            uses: 0,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn unbounded_invite_is_redeemable() {
        assert!(invite().is_redeemable(Utc::now()));
    }

    #[test]
    fn expired_invite_is_not_redeemable() {
        let mut subject = invite();
        subject.expires_at = Some(Utc::now() - Duration::minutes(1));
        assert!(!subject.is_redeemable(Utc::now()));
    }

    #[test]
    fn exhausted_invite_is_not_redeemable() {
        let mut subject = invite();
        subject.max_uses = Some(3);
        subject.uses = 3;
        assert!(!subject.is_redeemable(Utc::now()));
    }

    #[test]
    fn code_shape_is_validated() {
        assert!(validate_invite_code("abcDEF1234").is_ok());
        assert!(validate_invite_code("short").is_err());
        assert!(validate_invite_code("abc/EF1234").is_err());
    }
}
