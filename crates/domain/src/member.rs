//! Server membership records.

use chrono::{DateTime, Utc};
use lodge_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::ids::{RoleId, UserId};

/// Maximum nickname length.
pub const NICKNAME_MAX_LENGTH: usize = 32;

/// Lifecycle state of a server member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    /// Joined via invite but not yet approved/verified.
    Pending,
    /// Full member.
    Active,
    /// Temporarily muted by moderation; see `timeout_until`.
    TimedOut,
}

impl MemberStatus {
    /// Returns the storage string for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::TimedOut => "timed_out",
        }
    }

    /// Parses a storage string into a status.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "timed_out" => Ok(Self::TimedOut),
            _ => Err(AppError::Validation(format!(
                "unknown member status '{value}'"
            ))),
        }
    }
}

/// A membership row linking a user to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// The member's user account.
    pub user_id: UserId,
    /// Current lifecycle state.
    pub status: MemberStatus,
    /// Per-server nickname, if set.
    pub nickname: Option<String>,
    /// When an active timeout lapses, if any.
    pub timeout_until: Option<DateTime<Utc>>,
    /// Roles assigned to the member (excluding the implicit `@everyone`).
    pub role_ids: Vec<RoleId>,
    /// When the member joined.
    pub joined_at: DateTime<Utc>,
}

/// Validates an optional nickname.
pub fn validate_nickname(nickname: &str) -> AppResult<()> {
    if nickname.trim().is_empty() {
        return Err(AppError::Validation("nickname must not be blank".to_owned()));
    }
    if nickname.chars().count() > NICKNAME_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "nickname must not exceed {NICKNAME_MAX_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_string() {
        for status in [MemberStatus::Pending, MemberStatus::Active, MemberStatus::TimedOut] {
            assert_eq!(MemberStatus::parse(status.as_str()).ok(), Some(status));
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(MemberStatus::parse("banned").is_err());
    }

    #[test]
    fn blank_nickname_is_rejected() {
        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname("Al").is_ok());
    }
}
