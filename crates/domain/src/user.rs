//! User account value types and credential validation rules.

use chrono::{DateTime, Utc};
use lodge_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Maximum email length per RFC 5321 path limits.
pub const EMAIL_MAX_LENGTH: usize = 254;

/// Minimum username length.
pub const USERNAME_MIN_LENGTH: usize = 2;

/// Maximum username length.
pub const USERNAME_MAX_LENGTH: usize = 32;

/// Minimum password length.
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Maximum password length (protects Argon2id from absurd inputs).
pub const PASSWORD_MAX_LENGTH: usize = 128;

/// Validated, lowercased email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Creates a validated email address.
    ///
    /// Structural validation: exactly one `@`, non-empty local part and
    /// domain, domain contains a `.`, total length at most 254 characters.
    /// The stored form is trimmed and lowercased.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim().to_lowercase();

        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "email address must not be empty".to_owned(),
            ));
        }

        if trimmed.len() > EMAIL_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "email address must not exceed {EMAIL_MAX_LENGTH} characters"
            )));
        }

        let Some((local, domain)) = trimmed.split_once('@') else {
            return Err(AppError::Validation(
                "email address must contain exactly one '@'".to_owned(),
            ));
        };

        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(AppError::Validation(
                "email address is malformed".to_owned(),
            ));
        }

        if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return Err(AppError::Validation(
                "email domain must contain at least one '.'".to_owned(),
            ));
        }

        Ok(Self(trimmed))
    }

    /// Returns the validated email string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the domain part of the address.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

/// Validated username with preserved casing.
///
/// The lowercase form is the uniqueness key; the cased form is what other
/// members see.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    /// Creates a validated username: 2-32 characters from `[A-Za-z0-9_.]`.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let length = value.chars().count();

        if length < USERNAME_MIN_LENGTH {
            return Err(AppError::Validation(format!(
                "username must be at least {USERNAME_MIN_LENGTH} characters"
            )));
        }

        if length > USERNAME_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "username must not exceed {USERNAME_MAX_LENGTH} characters"
            )));
        }

        let valid = value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.');
        if !valid {
            return Err(AppError::Validation(
                "username may only contain letters, digits, '_' and '.'".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the username as entered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the lowercase uniqueness key.
    #[must_use]
    pub fn lowercase(&self) -> String {
        self.0.to_lowercase()
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

/// Validates a plaintext password: 8-128 characters.
pub fn validate_password(password: &str) -> AppResult<()> {
    let length = password.chars().count();

    if length < PASSWORD_MIN_LENGTH {
        return Err(AppError::Validation(format!(
            "password must be at least {PASSWORD_MIN_LENGTH} characters"
        )));
    }

    if length > PASSWORD_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "password must not exceed {PASSWORD_MAX_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Editable profile fields on a user account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Name shown in the member list instead of the username, if set.
    pub display_name: Option<String>,
    /// Storage key of the avatar blob, if set.
    pub avatar_key: Option<String>,
    /// Storage key of the profile banner blob, if set.
    pub banner_key: Option<String>,
    /// Free-form pronouns field.
    pub pronouns: Option<String>,
    /// Free-form about-me text.
    pub about: Option<String>,
    /// Primary theme colour as 24-bit RGB.
    pub theme_primary: Option<u32>,
    /// Accent theme colour as 24-bit RGB.
    pub theme_accent: Option<u32>,
}

/// A user account row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique account identifier.
    pub id: UserId,
    /// Canonical (lowercased) email address.
    pub email: String,
    /// Username with original casing preserved.
    pub username: String,
    /// Whether the email address has been verified.
    pub email_verified: bool,
    /// Whether TOTP MFA is enabled.
    pub mfa_enabled: bool,
    /// Profile fields.
    pub profile: UserProfile,
    /// Account creation time.
    pub created_at: DateTime<Utc>,
}
