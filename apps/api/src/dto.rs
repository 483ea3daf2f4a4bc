//! Request and response shapes for the HTTP API.

use chrono::{DateTime, Utc};
use lodge_application::{LoginOutcome, TokenPair};
use lodge_domain::User;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct MfaVerifyRequest {
    pub ticket: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct MfaConfirmRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens {
        access_token: String,
        refresh_token: String,
        user: User,
    },
    MfaChallenge {
        mfa_ticket: String,
    },
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Tokens { tokens, user } => Self::Tokens {
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                user,
            },
            LoginOutcome::MfaChallenge { ticket } => Self::MfaChallenge { mfa_ticket: ticket },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for RefreshResponse {
    fn from(tokens: TokenPair) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MfaEnrollmentResponse {
    pub secret: String,
    pub otpauth_uri: String,
}

#[derive(Debug, Serialize)]
pub struct RecoveryCodesResponse {
    pub recovery_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    pub display_name: Option<String>,
    pub avatar_key: Option<String>,
    pub banner_key: Option<String>,
    pub pronouns: Option<String>,
    pub about: Option<String>,
    pub theme_primary: Option<u32>,
    pub theme_accent: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    pub category_id: Option<lodge_domain::CategoryId>,
    pub topic: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub voice: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChannelRequest {
    pub name: Option<String>,
    #[serde(default, with = "double_option")]
    pub topic: Option<Option<String>>,
    pub position: Option<i32>,
    #[serde(default, with = "double_option")]
    pub category_id: Option<Option<lodge_domain::CategoryId>>,
}

#[derive(Debug, Deserialize)]
pub struct SetOverrideRequest {
    pub target_type: OverrideTargetType,
    pub target_id: uuid::Uuid,
    pub allow: u64,
    pub deny: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideTargetType {
    Role,
    User,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    #[serde(default)]
    pub content: String,
    pub reply_to: Option<lodge_domain::MessageId>,
    #[serde(default)]
    pub attachment_ids: Vec<lodge_domain::AttachmentId>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<lodge_domain::MessageId>,
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

fn default_history_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub permissions: u64,
    #[serde(default)]
    pub position: i32,
    pub color: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub permissions: Option<u64>,
    pub position: Option<i32>,
    #[serde(default, with = "double_option")]
    pub color: Option<Option<u32>>,
}

#[derive(Debug, Deserialize)]
pub struct NicknameRequest {
    pub nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TimeoutRequest {
    pub until: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub channel_id: lodge_domain::ChannelId,
    pub max_uses: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQueryParams {
    pub q: String,
    pub channel_id: Option<lodge_domain::ChannelId>,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

fn default_search_limit() -> u32 {
    25
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHitDto>,
}

#[derive(Debug, Serialize)]
pub struct SearchHitDto {
    pub message_id: lodge_domain::MessageId,
    pub channel_id: lodge_domain::ChannelId,
    pub content: String,
}

/// Distinguishes "field absent" from "field set to null" in PATCH bodies.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
