//! Role records and validation.

use chrono::{DateTime, Utc};
use lodge_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::ids::RoleId;
use crate::permissions::Permissions;

/// Maximum role name length.
pub const ROLE_NAME_MAX_LENGTH: usize = 64;

/// A role in the server's permission hierarchy.
///
/// Exactly one role per server has `is_everyone = true`; it is held
/// implicitly by every member and anchors position 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Unique role identifier.
    pub id: RoleId,
    /// Display name.
    pub name: String,
    /// Permission bits granted by the role.
    pub permissions: Permissions,
    /// Hierarchy position; higher beats lower.
    pub position: i32,
    /// Display colour as 24-bit RGB, if set.
    pub color: Option<u32>,
    /// Whether this is the implicit `@everyone` role.
    pub is_everyone: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Validates a role name.
pub fn validate_role_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("role name must not be blank".to_owned()));
    }
    if name.chars().count() > ROLE_NAME_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "role name must not exceed {ROLE_NAME_MAX_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_role_name;

    #[test]
    fn role_name_boundaries() {
        assert!(validate_role_name("Moderators").is_ok());
        assert!(validate_role_name("").is_err());
        assert!(validate_role_name(&"r".repeat(65)).is_err());
    }
}
