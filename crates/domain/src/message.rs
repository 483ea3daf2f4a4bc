//! Message records and content validation.

use chrono::{DateTime, Utc};
use lodge_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::ids::{AttachmentId, ChannelId, MessageId, UserId};

/// Maximum message content length in characters.
pub const MESSAGE_CONTENT_MAX_LENGTH: usize = 4000;

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// Channel the message was posted in.
    pub channel_id: ChannelId,
    /// Author of the message.
    pub author_id: UserId,
    /// Message body.
    pub content: String,
    /// Message being replied to, if any.
    pub reply_to: Option<MessageId>,
    /// Whether the message is pinned in its channel.
    pub pinned: bool,
    /// Soft-deletion flag; deleted messages keep their row for reply chains.
    pub deleted: bool,
    /// Attachments included with the message.
    pub attachment_ids: Vec<AttachmentId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last edit time, if the message was edited.
    pub edited_at: Option<DateTime<Utc>>,
}

/// Validates message content.
///
/// Content may be empty only when the message carries attachments; the
/// caller enforces that coupling.
pub fn validate_message_content(content: &str, has_attachments: bool) -> AppResult<()> {
    if content.trim().is_empty() && !has_attachments {
        return Err(AppError::Validation(
            "message must have content or attachments".to_owned(),
        ));
    }
    if content.chars().count() > MESSAGE_CONTENT_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "message must not exceed {MESSAGE_CONTENT_MAX_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_requires_attachments() {
        assert!(validate_message_content("", false).is_err());
        assert!(validate_message_content("", true).is_ok());
    }

    #[test]
    fn content_cap_is_enforced() {
        assert!(validate_message_content(&"m".repeat(4000), false).is_ok());
        assert!(validate_message_content(&"m".repeat(4001), false).is_err());
    }
}
