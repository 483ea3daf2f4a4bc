//! Server-wide configuration row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, UserId};

/// The single server-configuration row of this deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Display name of the server.
    pub name: String,
    /// Short description shown on the join screen, if set.
    pub description: Option<String>,
    /// Storage key of the server icon blob, if set.
    pub icon_key: Option<String>,
    /// The owner account; bypasses all permission checks and cannot be
    /// deleted.
    pub owner_id: UserId,
    /// Channel newcomers land in, if configured.
    pub default_channel_id: Option<ChannelId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
