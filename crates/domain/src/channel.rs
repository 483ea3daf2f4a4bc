//! Categories and channels.

use chrono::{DateTime, Utc};
use lodge_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::ids::{CategoryId, ChannelId};

/// Maximum channel or category name length.
pub const CHANNEL_NAME_MAX_LENGTH: usize = 100;

/// Maximum channel topic length.
pub const CHANNEL_TOPIC_MAX_LENGTH: usize = 1024;

/// A category grouping channels in the sidebar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Unique category identifier.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Sort position among categories.
    pub position: i32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A text or voice channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Unique channel identifier.
    pub id: ChannelId,
    /// Owning category, if the channel is not top-level.
    pub category_id: Option<CategoryId>,
    /// Display name.
    pub name: String,
    /// Channel topic shown in the header, if set.
    pub topic: Option<String>,
    /// Sort position within the category.
    pub position: i32,
    /// True for voice channels.
    pub voice: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Validates a channel or category name.
pub fn validate_channel_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation(
            "channel name must not be blank".to_owned(),
        ));
    }
    if name.chars().count() > CHANNEL_NAME_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "channel name must not exceed {CHANNEL_NAME_MAX_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Validates a channel topic.
pub fn validate_channel_topic(topic: &str) -> AppResult<()> {
    if topic.chars().count() > CHANNEL_TOPIC_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "channel topic must not exceed {CHANNEL_TOPIC_MAX_LENGTH} characters"
        )));
    }
    Ok(())
}
